//! Line formatting for matched events.

use std::fmt;
use std::str::FromStr;

use crate::error::ConstructionError;
use crate::event::Event;

/// Default output line: who edited which page.
pub const DEFAULT_FORMAT: &str = "{user} edited {title_url}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A line template with `{field}` placeholders.
///
/// `{{` and `}}` stand for literal braces.
///
/// ```
/// use wikiwatch::{Event, EventFormat};
///
/// let format = EventFormat::parse("{user} edited {title}").unwrap();
/// let event = Event::default().with("user", "alice").with("title", "Rust");
/// assert_eq!(format.render(&event).as_deref(), Some("alice edited Rust"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFormat {
    source: String,
    segments: Vec<Segment>,
}

impl EventFormat {
    /// Parse a template of literal text and `{field}` placeholders.
    ///
    /// `{{` and `}}` stand for literal braces. Unbalanced braces and empty
    /// placeholders are rejected.
    pub fn parse(format: &str) -> Result<Self, ConstructionError> {
        let invalid = |reason: &str| ConstructionError::InvalidFormat {
            format: format.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(invalid("nested '{' in placeholder")),
                            Some(c) => name.push(c),
                            None => return Err(invalid("unclosed '{'")),
                        }
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                '}' => return Err(invalid("unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: format.to_string(),
            segments,
        })
    }

    /// Field names referenced by the template, in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template, or `None` if the event lacks a referenced field.
    #[must_use]
    pub fn render(&self, event: &Event) -> Option<String> {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => out.push_str(&event.text(name)?),
            }
        }
        Some(out)
    }
}

impl Default for EventFormat {
    fn default() -> Self {
        Self {
            source: DEFAULT_FORMAT.to_string(),
            segments: vec![
                Segment::Field("user".to_string()),
                Segment::Literal(" edited ".to_string()),
                Segment::Field("title_url".to_string()),
            ],
        }
    }
}

impl FromStr for EventFormat {
    type Err = ConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
