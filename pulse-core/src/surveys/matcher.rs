//! Property matcher semantics
//!
//! One comparison per named event property. Matchers come from rule
//! configuration as `{"op": ..., "value": ...}` objects; the presence forms
//! carry no value.

use serde::{Deserialize, Serialize};

use crate::events::EventValue;

/// A literal a matcher compares an event property against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchAtom {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MatchAtom {
    /// Equality against an event value, with integer and equal-valued
    /// float treated as equal
    pub fn equals(&self, value: &EventValue) -> bool {
        self.to_event_value().loosely_equals(value)
    }

    fn to_event_value(&self) -> EventValue {
        match self {
            MatchAtom::Bool(b) => EventValue::Bool(*b),
            MatchAtom::Integer(n) => EventValue::Integer(*n),
            MatchAtom::Float(f) => EventValue::Float(*f),
            MatchAtom::Text(s) => EventValue::Text(s.clone()),
        }
    }
}

/// A single comparison against one event property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PropertyMatcher {
    /// Exact equality (numeric kinds cross-coerce)
    Equals { value: MatchAtom },
    /// Negated equality; an absent key does not match
    NotEquals { value: MatchAtom },
    /// Numeric greater-than; non-numeric values never match
    Gt { value: f64 },
    /// Numeric greater-or-equal
    Gte { value: f64 },
    /// Numeric less-than
    Lt { value: f64 },
    /// Numeric less-or-equal
    Lte { value: f64 },
    /// Substring test on the string projection
    Contains { value: String },
    /// Negated substring test; an absent key does not match
    NotContains { value: String },
    /// Key presence, value ignored
    Exists,
    /// Key absence
    NotExists,
}

impl PropertyMatcher {
    /// Whether the property satisfies this matcher.
    ///
    /// `value` is `None` when the event lacks the key. Only the presence
    /// forms can pass then; every value comparison fails on a missing key.
    pub fn matches(&self, value: Option<&EventValue>) -> bool {
        match (self, value) {
            (PropertyMatcher::Exists, _) => value.is_some(),
            (PropertyMatcher::NotExists, _) => value.is_none(),
            (_, None) => false,
            (PropertyMatcher::Equals { value: atom }, Some(v)) => atom.equals(v),
            (PropertyMatcher::NotEquals { value: atom }, Some(v)) => !atom.equals(v),
            (PropertyMatcher::Gt { value: rhs }, Some(v)) => {
                v.as_f64().is_some_and(|lhs| lhs > *rhs)
            }
            (PropertyMatcher::Gte { value: rhs }, Some(v)) => {
                v.as_f64().is_some_and(|lhs| lhs >= *rhs)
            }
            (PropertyMatcher::Lt { value: rhs }, Some(v)) => {
                v.as_f64().is_some_and(|lhs| lhs < *rhs)
            }
            (PropertyMatcher::Lte { value: rhs }, Some(v)) => {
                v.as_f64().is_some_and(|lhs| lhs <= *rhs)
            }
            (PropertyMatcher::Contains { value: needle }, Some(v)) => {
                v.to_string().contains(needle)
            }
            (PropertyMatcher::NotContains { value: needle }, Some(v)) => {
                !v.to_string().contains(needle)
            }
        }
    }
}
