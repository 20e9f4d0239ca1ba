//! Field predicates: exact strings and regular expressions.

use std::fmt;

use regex::Regex;

use crate::error::ConstructionError;
use crate::event::Event;

#[derive(Debug, Clone)]
enum FieldMatcher {
    Equals(String),
    Search(Regex),
    Prefix(Regex),
}

/// Leaf predicate over the textual value of one named field.
///
/// A missing field is a non-match, never an error.
///
/// # Examples
///
/// ```
/// use wikiwatch::{Event, FieldPredicate};
///
/// let bots = FieldPredicate::regex_search("user", r"[Bb]ot").unwrap();
/// assert!(bots.evaluate(&Event::default().with("user", "SomeBot99")));
/// assert!(!bots.evaluate(&Event::default().with("title_url", "https://x")));
/// ```
#[derive(Debug, Clone)]
pub struct FieldPredicate {
    field: String,
    matcher: FieldMatcher,
}

impl FieldPredicate {
    /// Field value must equal `value` exactly.
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Result<Self, ConstructionError> {
        Self::build(field.into(), FieldMatcher::Equals(value.into()))
    }

    /// Field value must contain a match of `pattern` anywhere.
    pub fn regex_search(field: impl Into<String>, pattern: &str) -> Result<Self, ConstructionError> {
        Self::build(field.into(), FieldMatcher::Search(compile(pattern)?))
    }

    /// Field value must match `pattern` starting at its first character.
    pub fn regex_match(field: impl Into<String>, pattern: &str) -> Result<Self, ConstructionError> {
        Self::build(field.into(), FieldMatcher::Prefix(compile(pattern)?))
    }

    fn build(field: String, matcher: FieldMatcher) -> Result<Self, ConstructionError> {
        if field.is_empty() {
            return Err(ConstructionError::EmptyFieldName);
        }
        Ok(Self { field, matcher })
    }

    /// Field tested by this predicate.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Evaluate against one event.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> bool {
        let Some(value) = event.text(&self.field) else {
            return false;
        };
        match &self.matcher {
            FieldMatcher::Equals(expected) => value == expected.as_str(),
            FieldMatcher::Search(re) => re.is_match(&value),
            // Leftmost-first: if any match starts at 0, `find` reports it.
            FieldMatcher::Prefix(re) => re.find(&value).is_some_and(|m| m.start() == 0),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ConstructionError> {
    Regex::new(pattern).map_err(|e| ConstructionError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl fmt::Display for FieldPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            FieldMatcher::Equals(v) => write!(f, "equals({}: {v:?})", self.field),
            FieldMatcher::Search(re) => write!(f, "search({}: {})", self.field, re.as_str()),
            FieldMatcher::Prefix(re) => write!(f, "match({}: {})", self.field, re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_finds_anywhere() {
        let p = FieldPredicate::regex_search("user", r"[Bb]ot").unwrap();
        assert!(p.evaluate(&Event::default().with("user", "SomeBot99")));
        assert!(p.evaluate(&Event::default().with("user", "bot")));
        assert!(!p.evaluate(&Event::default().with("user", "Alice")));
    }

    #[test]
    fn test_absent_field_is_false() {
        let p = FieldPredicate::regex_search("user", ".*").unwrap();
        assert!(!p.evaluate(&Event::default().with("title_url", "https://x")));
        assert!(!p.evaluate(&Event::default().with("user", serde_json::Value::Null)));
    }

    #[test]
    fn test_prefix_match_is_anchored_at_start() {
        let p = FieldPredicate::regex_match("title", "Python").unwrap();
        assert!(p.evaluate(&Event::default().with("title", "Python (language)")));
        assert!(!p.evaluate(&Event::default().with("title", "CPython")));

        let alt = FieldPredicate::regex_match("title", "b|ab").unwrap();
        assert!(alt.evaluate(&Event::default().with("title", "abc")));
    }

    #[test]
    fn test_equals_uses_textual_form() {
        let p = FieldPredicate::equals("bot", "true").unwrap();
        assert!(p.evaluate(&Event::default().with("bot", true)));
        assert!(!p.evaluate(&Event::default().with("bot", false)));

        let ns = FieldPredicate::equals("namespace", "0").unwrap();
        assert!(ns.evaluate(&Event::default().with("namespace", 0)));
    }

    #[test]
    fn test_invalid_regex_fails_construction() {
        let err = FieldPredicate::regex_search("user", "(unclosed").unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidRegex { .. }));
    }

    #[test]
    fn test_empty_field_name_rejected() {
        assert_eq!(
            FieldPredicate::equals("", "x").unwrap_err(),
            ConstructionError::EmptyFieldName
        );
    }

    #[test]
    fn test_display() {
        let p = FieldPredicate::regex_search("user", "bot").unwrap();
        assert_eq!(p.to_string(), "search(user: bot)");
    }
}
