//! Address-range patterns.
//!
//! A pattern is a fixed number of fields, one per address component: four
//! decimal fields separated by `.` for IPv4, eight hexadecimal fields separated
//! by `:` for IPv6. Each field is `*`, a single value, or an inclusive range
//! `low-high`. IPv6 `::` compression is not supported in patterns or in
//! candidate addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConstructionError;
use crate::event::{fields, Event};

/// IP address family of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    /// Four dot-separated decimal octets.
    V4,
    /// Eight colon-separated hexadecimal groups.
    V6,
}

impl AddressFamily {
    /// Number of fields in an address of this family.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::V4 => 4,
            Self::V6 => 8,
        }
    }

    /// Largest value a single field may hold.
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::V4 => 0xff,
            Self::V6 => 0xffff,
        }
    }

    const fn separator(self) -> char {
        match self {
            Self::V4 => '.',
            Self::V6 => ':',
        }
    }

    const fn radix(self) -> u32 {
        match self {
            Self::V4 => 10,
            Self::V6 => 16,
        }
    }

    /// Parse one field value, or `None` if it is not a number in this family's notation.
    ///
    /// Values that are numeric but too large come back as `Some(Err(()))`.
    fn parse_value(self, text: &str) -> Option<Result<u16, ()>> {
        let radix = self.radix();
        if text.is_empty() || !text.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        let trimmed = text.trim_start_matches('0');
        if trimmed.is_empty() {
            return Some(Ok(0));
        }
        // Any digit string longer than this overflows the family's domain.
        if trimmed.len() > 5 {
            return Some(Err(()));
        }
        match u32::from_str_radix(trimmed, radix) {
            Ok(v) if v <= u32::from(self.max_value()) => Some(Ok(v as u16)),
            _ => Some(Err(())),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "ipv4"),
            Self::V6 => write!(f, "ipv6"),
        }
    }
}

/// Pattern for a single address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldPattern {
    /// `*`: any value in the family's domain.
    Any,
    /// A single value.
    Exact { value: u16 },
    /// Inclusive range; `low <= high` always holds.
    Range { low: u16, high: u16 },
}

impl FieldPattern {
    /// Test one candidate field value.
    #[must_use]
    pub const fn matches(&self, value: u16) -> bool {
        match *self {
            Self::Any => true,
            Self::Exact { value: v } => v == value,
            Self::Range { low, high } => low <= value && value <= high,
        }
    }
}

/// A parsed address-range expression.
///
/// # Examples
///
/// ```
/// use wikiwatch::AddressPattern;
///
/// let pattern = AddressPattern::parse_v4("192.60.38.225-230").unwrap();
/// assert!(pattern.matches("192.60.38.225"));
/// assert!(pattern.matches("192.60.38.230"));
/// assert!(!pattern.matches("192.60.38.231"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressPattern {
    family: AddressFamily,
    fields: Vec<FieldPattern>,
}

impl AddressPattern {
    /// A pattern matching every address of the given family.
    #[must_use]
    pub fn any(family: AddressFamily) -> Self {
        Self {
            family,
            fields: vec![FieldPattern::Any; family.arity()],
        }
    }

    /// Parse a pattern of the given family.
    pub fn parse(family: AddressFamily, pattern: &str) -> Result<Self, ConstructionError> {
        let parts: Vec<&str> = pattern.split(family.separator()).collect();
        if parts.len() != family.arity() {
            return Err(ConstructionError::FieldCount {
                pattern: pattern.to_string(),
                expected: family.arity(),
                actual: parts.len(),
            });
        }

        let fields = parts
            .into_iter()
            .map(|part| parse_field(family, pattern, part))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { family, fields })
    }

    /// Parse an IPv4 pattern such as `10.0-127.*.*`.
    pub fn parse_v4(pattern: &str) -> Result<Self, ConstructionError> {
        Self::parse(AddressFamily::V4, pattern)
    }

    /// Parse an IPv6 pattern such as `2600:5801:34a:0-ffff:*:*:*:*`.
    pub fn parse_v6(pattern: &str) -> Result<Self, ConstructionError> {
        Self::parse(AddressFamily::V6, pattern)
    }

    /// Parse a pattern of either family; `:` selects IPv6, anything else IPv4.
    pub fn parse_any(pattern: &str) -> Result<Self, ConstructionError> {
        if pattern.contains(':') {
            Self::parse_v6(pattern)
        } else if pattern.contains('.') {
            Self::parse_v4(pattern)
        } else {
            Err(ConstructionError::UnknownAddressFamily {
                pattern: pattern.to_string(),
            })
        }
    }

    /// Family of this pattern.
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    /// Per-field patterns, most significant first.
    #[must_use]
    pub fn fields(&self) -> &[FieldPattern] {
        &self.fields
    }

    /// Test a candidate address.
    ///
    /// Anything that is not a full-length address of this pattern's family,
    /// including an address of the other family, is a non-match.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let mut parts = candidate.split(self.family.separator());
        for field in &self.fields {
            let Some(part) = parts.next() else {
                return false;
            };
            match self.family.parse_value(part) {
                Some(Ok(value)) if field.matches(value) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn parse_field(
    family: AddressFamily,
    pattern: &str,
    field: &str,
) -> Result<FieldPattern, ConstructionError> {
    if field == "*" {
        return Ok(FieldPattern::Any);
    }

    let value = |text: &str| match family.parse_value(text) {
        Some(Ok(v)) => Ok(v),
        Some(Err(())) => Err(ConstructionError::OutOfRange {
            pattern: pattern.to_string(),
            field: field.to_string(),
            max: family.max_value(),
        }),
        None => Err(ConstructionError::InvalidField {
            pattern: pattern.to_string(),
            field: field.to_string(),
        }),
    };

    match field.split_once('-') {
        Some((low, high)) => {
            let (low, high) = (value(low)?, value(high)?);
            if low > high {
                return Err(ConstructionError::InvertedRange {
                    pattern: pattern.to_string(),
                    low,
                    high,
                });
            }
            Ok(FieldPattern::Range { low, high })
        }
        None => Ok(FieldPattern::Exact { value: value(field)? }),
    }
}

impl FromStr for AddressPattern {
    type Err = ConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_any(s)
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.family.separator())?;
            }
            match (self.family, field) {
                (_, FieldPattern::Any) => write!(f, "*")?,
                (AddressFamily::V4, FieldPattern::Exact { value }) => write!(f, "{value}")?,
                (AddressFamily::V6, FieldPattern::Exact { value }) => write!(f, "{value:x}")?,
                (AddressFamily::V4, FieldPattern::Range { low, high }) => write!(f, "{low}-{high}")?,
                (AddressFamily::V6, FieldPattern::Range { low, high }) => {
                    write!(f, "{low:x}-{high:x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Leaf predicate testing an event field against an [`AddressPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressPredicate {
    field: String,
    pattern: AddressPattern,
}

impl AddressPredicate {
    /// Test the `user` field, which holds the IP address of anonymous editors.
    #[must_use]
    pub fn new(pattern: AddressPattern) -> Self {
        Self {
            field: fields::USER.to_string(),
            pattern,
        }
    }

    /// Test a different field instead of `user`.
    pub fn on_field(mut self, field: impl Into<String>) -> Result<Self, ConstructionError> {
        let field = field.into();
        if field.is_empty() {
            return Err(ConstructionError::EmptyFieldName);
        }
        self.field = field;
        Ok(self)
    }

    /// Field tested by this predicate.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The address pattern.
    #[must_use]
    pub const fn pattern(&self) -> &AddressPattern {
        &self.pattern
    }

    /// Absent fields and non-address values never match.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> bool {
        event
            .text(&self.field)
            .is_some_and(|value| self.pattern.matches(&value))
    }
}

impl fmt::Display for AddressPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}: {})", self.pattern.family, self.field, self.pattern)
    }
}
