//! Decoded edit events.
//!
//! An [`Event`] is one message from the recent-changes feed, decoded into a
//! mapping from field name to JSON value. Events are created by the dispatcher
//! for a single iteration and dropped once every binding has seen them.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Well-known field names of the recent-changes schema.
///
/// See <https://www.mediawiki.org/wiki/Manual:RCFeed>.
pub mod fields {
    /// User name, or the IP address for anonymous edits.
    pub const USER: &str = "user";
    /// Page title.
    pub const TITLE: &str = "title";
    /// Canonical URL of the edited page.
    pub const TITLE_URL: &str = "title_url";
    /// Whether the edit was flagged as made by a bot.
    pub const BOT: &str = "bot";
    /// Host name of the wiki, e.g. `en.wikipedia.org`.
    pub const SERVER_NAME: &str = "server_name";
    /// Database name of the wiki, e.g. `enwiki`.
    pub const WIKI: &str = "wiki";
    /// Edit summary.
    pub const COMMENT: &str = "comment";
    /// Unix timestamp of the change.
    pub const TIMESTAMP: &str = "timestamp";
    /// Change type (`edit`, `new`, `log`, ...).
    pub const TYPE: &str = "type";
    /// Namespace number of the page.
    pub const NAMESPACE: &str = "namespace";
}

/// One decoded edit notification.
///
/// # Examples
///
/// ```
/// use wikiwatch::Event;
///
/// let event = Event::from_json(r#"{"user": "10.0.0.1", "bot": false}"#).unwrap();
/// assert_eq!(event.text("user").as_deref(), Some("10.0.0.1"));
/// assert_eq!(event.text("bot").as_deref(), Some("false"));
/// assert!(event.text("title").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Decode an event from the JSON payload of one stream message.
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(payload).map_err(|e| DecodeError::Json {
            message: e.to_string(),
        })?;

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DecodeError::NotAnObject {
                found: type_name(&other),
            }),
        }
    }

    /// Builder-style field insertion, mostly useful for tests and fixtures.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Raw value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Textual form of a field, as seen by string and regex predicates.
    ///
    /// Strings are returned verbatim, scalars as their JSON text and nested
    /// values as compact JSON. `null` counts as absent.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.fields.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Returns true for log entries (user creation, blocks, moves), which the
    /// feed reports in the special namespace `-1`.
    #[must_use]
    pub fn is_log_event(&self) -> bool {
        self.get(fields::NAMESPACE).and_then(Value::as_i64) == Some(-1)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the event has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume the event and return the underlying JSON object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Event {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_object() {
        let event = Event::from_json(r#"{"user": "Alice", "namespace": 0}"#).unwrap();
        assert_eq!(event.len(), 2);
        assert!(event.contains(fields::USER));
        assert_eq!(event.text(fields::NAMESPACE).as_deref(), Some("0"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = Event::from_json("[1, 2, 3]").unwrap_err();
        assert_eq!(err, DecodeError::NotAnObject { found: "array" });
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Event::from_json("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json { .. }));
    }

    #[test]
    fn test_text_forms() {
        let event = Event::from_json(
            r#"{"s": "x", "b": true, "f": 1.5, "n": null, "o": {"a": 1}}"#,
        )
        .unwrap();
        assert_eq!(event.text("s").as_deref(), Some("x"));
        assert_eq!(event.text("b").as_deref(), Some("true"));
        assert_eq!(event.text("f").as_deref(), Some("1.5"));
        assert_eq!(event.text("n"), None);
        assert_eq!(event.text("o").as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(event.text("missing"), None);
    }

    #[test]
    fn test_with_builder() {
        let event = Event::default().with("user", "Bob").with("bot", true);
        assert_eq!(event.get("bot"), Some(&Value::Bool(true)));
        assert_eq!(event.text("user").as_deref(), Some("Bob"));
    }

    #[test]
    fn test_log_event_detection() {
        assert!(Event::default().with(fields::NAMESPACE, -1).is_log_event());
        assert!(!Event::default().with(fields::NAMESPACE, 0).is_log_event());
        assert!(!Event::default().with(fields::NAMESPACE, "-1").is_log_event());
        assert!(!Event::default().is_log_event());
    }
}
