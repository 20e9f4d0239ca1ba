//! Filter predicate engine.
//!
//! Leaf predicates test one event field: [`AddressPredicate`] against an
//! address-range pattern, [`FieldPredicate`] against an exact string or a
//! regular expression. [`Predicate`] ties them together with nested
//! ALL/ANY collections.

/// Address-range patterns and the address predicate.
pub mod address;
/// Exact-string and regex field predicates.
pub mod field;
/// Predicate trees and boolean composition.
pub mod predicate;

pub use address::{AddressFamily, AddressPattern, AddressPredicate, FieldPattern};
pub use field::FieldPredicate;
pub use predicate::{MatchType, Predicate, PredicateCollection};
