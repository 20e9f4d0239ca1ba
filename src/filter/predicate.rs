//! Predicate trees.
//!
//! [`Predicate`] is a closed set of variants sharing one `evaluate` contract.
//! Collections combine children with [`MatchType::All`] or [`MatchType::Any`]
//! and may be nested without limit.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

use crate::error::ConstructionError;
use crate::event::{fields, Event};
use crate::watch::{Binding, CallbackResult};

use super::address::{AddressFamily, AddressPattern, AddressPredicate};
use super::field::FieldPredicate;

/// How a collection combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Every child must match. An empty collection matches.
    #[default]
    All,
    /// At least one child must match. An empty collection never matches.
    Any,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Ordered children combined under one [`MatchType`].
#[derive(Debug, Clone, Default)]
pub struct PredicateCollection {
    children: Vec<Predicate>,
    match_type: MatchType,
}

impl PredicateCollection {
    /// Collection of `children` combined with `match_type`.
    #[must_use]
    pub fn new(match_type: MatchType, children: impl IntoIterator<Item = Predicate>) -> Self {
        Self {
            children: children.into_iter().collect(),
            match_type,
        }
    }

    /// Same children, different combination rule.
    #[must_use]
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    /// Switch between conjunction and disjunction in place.
    pub fn set_match_type(&mut self, match_type: MatchType) {
        self.match_type = match_type;
    }

    /// How the children are combined.
    #[must_use]
    pub const fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// Append a child; it is evaluated after the existing ones.
    pub fn push(&mut self, child: impl Into<Predicate>) {
        self.children.push(child.into());
    }

    /// Children in evaluation order.
    #[must_use]
    pub fn children(&self) -> &[Predicate] {
        &self.children
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns true if the collection has no children.
    ///
    /// An empty `All` collection matches every event, an empty `Any` none.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Short-circuits in child order.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> bool {
        match self.match_type {
            MatchType::All => self.children.iter().all(|c| c.evaluate(event)),
            MatchType::Any => self.children.iter().any(|c| c.evaluate(event)),
        }
    }
}

/// A boolean test over an event.
///
/// # Examples
///
/// ```
/// use wikiwatch::{Event, Predicate};
///
/// let pages = Predicate::page_url_regex("Python_\\(programming_language\\)").unwrap()
///     | Predicate::page_url_regex("CPython").unwrap();
/// let filter = pages & Predicate::username_regex("[Bb][Oo][Tt]").unwrap();
///
/// let event = Event::default()
///     .with("user", "ExampleBot")
///     .with("title_url", "https://en.wikipedia.org/wiki/CPython");
/// assert!(filter.evaluate(&event));
/// ```
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Anonymous-editor address test on the `user` field.
    Address(AddressPredicate),
    /// Equality or regex test on one named field.
    Field(FieldPredicate),
    /// Nested predicates combined with `All` or `Any`.
    Collection(PredicateCollection),
}

impl Predicate {
    /// Anonymous edits from IPv4 addresses matching `pattern`.
    pub fn ipv4(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(AddressPredicate::new(AddressPattern::parse_v4(pattern)?).into())
    }

    /// Anonymous edits from IPv6 addresses matching `pattern`.
    pub fn ipv6(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(AddressPredicate::new(AddressPattern::parse_v6(pattern)?).into())
    }

    /// Anonymous edits from an address pattern of either family.
    pub fn address(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(AddressPredicate::new(AddressPattern::parse_any(pattern)?).into())
    }

    /// Every anonymous IPv4 edit.
    #[must_use]
    pub fn any_ipv4() -> Self {
        AddressPredicate::new(AddressPattern::any(AddressFamily::V4)).into()
    }

    /// Every anonymous IPv6 edit.
    #[must_use]
    pub fn any_ipv6() -> Self {
        AddressPredicate::new(AddressPattern::any(AddressFamily::V6)).into()
    }

    /// Every anonymous edit, IPv4 or IPv6.
    #[must_use]
    pub fn any_address() -> Self {
        Self::any_ipv4().or(Self::any_ipv6())
    }

    /// Edits by exactly `name`.
    pub fn username(name: impl Into<String>) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::equals(fields::USER, name)?.into())
    }

    /// Edits whose user name contains a match of `pattern`.
    pub fn username_regex(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::regex_search(fields::USER, pattern)?.into())
    }

    /// Edits whose user name matches `pattern` from its first character.
    pub fn username_regex_match(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::regex_match(fields::USER, pattern)?.into())
    }

    /// Edits to the page at exactly `url`.
    pub fn page_url(url: impl Into<String>) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::equals(fields::TITLE_URL, url)?.into())
    }

    /// Edits whose page URL contains a match of `pattern`.
    pub fn page_url_regex(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::regex_search(fields::TITLE_URL, pattern)?.into())
    }

    /// Edits whose page URL matches `pattern` from its first character.
    pub fn page_url_regex_match(pattern: &str) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::regex_match(fields::TITLE_URL, pattern)?.into())
    }

    /// Regex search over an arbitrary named field.
    pub fn field_regex(field: impl Into<String>, pattern: &str) -> Result<Self, ConstructionError> {
        Ok(FieldPredicate::regex_search(field, pattern)?.into())
    }

    /// Collection requiring every predicate to match.
    #[must_use]
    pub fn all(children: impl IntoIterator<Item = Self>) -> Self {
        PredicateCollection::new(MatchType::All, children).into()
    }

    /// Collection requiring at least one predicate to match.
    #[must_use]
    pub fn any(children: impl IntoIterator<Item = Self>) -> Self {
        PredicateCollection::new(MatchType::Any, children).into()
    }

    /// `self AND other`, as a new two-child collection (left then right).
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::all([self, other])
    }

    /// `self OR other`, as a new two-child collection (left then right).
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::any([self, other])
    }

    /// Test `event`. Missing or mistyped fields never match.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> bool {
        match self {
            Self::Address(p) => p.evaluate(event),
            Self::Field(p) => p.evaluate(event),
            Self::Collection(c) => c.evaluate(event),
        }
    }

    /// Attach a callback, producing a binding for a watcher.
    #[must_use]
    pub fn on_match<F>(self, callback: F) -> Binding
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        Binding::new(self, callback)
    }
}

impl From<AddressPredicate> for Predicate {
    fn from(p: AddressPredicate) -> Self {
        Self::Address(p)
    }
}

impl From<FieldPredicate> for Predicate {
    fn from(p: FieldPredicate) -> Self {
        Self::Field(p)
    }
}

impl From<PredicateCollection> for Predicate {
    fn from(c: PredicateCollection) -> Self {
        Self::Collection(c)
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(p) => write!(f, "{p}"),
            Self::Field(p) => write!(f, "{p}"),
            Self::Collection(c) => {
                write!(f, "{}(", c.match_type)?;
                for (i, child) in c.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}
