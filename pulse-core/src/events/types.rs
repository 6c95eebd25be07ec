//! Event type definitions

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed property value attached to an event.
///
/// Closed sum over the four scalar kinds the rule language understands.
/// There is no null variant: an absent property is expressed by the key
/// not being present in [`EventProperties`]. Serializes untagged, so stored
/// JSON carries plain scalars (`"pro"`, `42`, `3.5`, `true`).
///
/// `Integer` must precede `Float` so untagged deserialization keeps whole
/// JSON numbers integral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl EventValue {
    /// Numeric projection used by ordering matchers.
    ///
    /// Integers and floats project onto f64; strings and booleans have no
    /// numeric projection and never satisfy a numeric comparison.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EventValue::Integer(n) => Some(*n as f64),
            EventValue::Float(f) => Some(*f),
            EventValue::Bool(_) | EventValue::Text(_) => None,
        }
    }

    /// Whether two values are equal, coercing across the numeric kinds.
    ///
    /// `Integer(75)` equals `Float(75.0)`; everything else requires the
    /// same variant and payload.
    pub fn loosely_equals(&self, other: &EventValue) -> bool {
        match (self, other) {
            (EventValue::Integer(a), EventValue::Float(b))
            | (EventValue::Float(b), EventValue::Integer(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }
}

/// String projection, used when logging property values.
impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Bool(b) => write!(f, "{b}"),
            EventValue::Integer(n) => write!(f, "{n}"),
            EventValue::Float(x) => write!(f, "{x}"),
            EventValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        EventValue::Bool(v)
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        EventValue::Integer(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Float(v)
    }
}

impl From<&str> for EventValue {
    fn from(v: &str) -> Self {
        EventValue::Text(v.to_string())
    }
}

impl From<String> for EventValue {
    fn from(v: String) -> Self {
        EventValue::Text(v)
    }
}

/// Ordered property mapping attached to events and sessions.
///
/// BTreeMap keeps iteration and serialization deterministic (key order).
pub type EventProperties = BTreeMap<String, EventValue>;

/// A recorded occurrence, scoped to a session.
///
/// Immutable after creation: the id is generated once, the timestamp is
/// taken at construction, and the owning session's log never rewrites an
/// appended entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier (UUID v4), never reused
    pub id: String,
    /// Event name, e.g. `"checkout_completed"`
    pub name: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Typed properties, ordered by key
    #[serde(default)]
    pub properties: EventProperties,
    /// Session this event belongs to
    pub session_id: String,
    /// User of the owning session, if bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Event {
    /// Create a new event stamped with a fresh id and the current time.
    pub fn new(
        name: impl Into<String>,
        properties: EventProperties,
        session_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            timestamp: Utc::now(),
            properties,
            session_id: session_id.into(),
            user_id,
        }
    }
}
