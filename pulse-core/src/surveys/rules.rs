//! Declarative survey rule language
//!
//! Rules arrive as a JSON document with camelCase keys, typically fetched
//! by the host from wherever it keeps remote configuration. The core only
//! consumes the parsed form; `SurveyConfig::from_json` is the single entry
//! point for parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::events::Event;

use super::matcher::PropertyMatcher;

/// The active rule set, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    pub surveys: Vec<SurveyRule>,
}

impl SurveyConfig {
    /// Parse a configuration document.
    ///
    /// On failure nothing is installed; the caller keeps whatever rule set
    /// was active before.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::InvalidJson)
    }

    /// Look up a rule by id
    pub fn rule(&self, id: &str) -> Option<&SurveyRule> {
        self.surveys.iter().find(|rule| rule.id == id)
    }
}

/// One survey rule: when to fire, what to ask, how often to allow it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRule {
    /// Stable identifier, used for gating and scheduling state
    pub id: String,
    /// Prompt title shown by the host UI
    pub title: String,
    /// Prompt body
    pub message: String,
    /// What kind of answer the survey collects
    pub response: SurveyResponse,
    /// When the survey fires
    pub trigger: TriggerCondition,
    /// At most once per session (default on)
    #[serde(default = "default_once_per_session")]
    pub once_per_session: bool,
    /// At most once ever per user
    #[serde(default)]
    pub once_per_user: bool,
    /// Minimum seconds between presentations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,
    /// Stop asking after this many presentations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Cooldown applied between attempts; takes precedence over
    /// `cooldown_seconds` whenever configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_cooldown_seconds: Option<u64>,
    /// Re-engagement payload for the host's notification channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationContent>,
}

fn default_once_per_session() -> bool {
    true
}

/// What fires a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerCondition {
    /// A recorded event matched
    Event(EventTrigger),
}

impl TriggerCondition {
    /// Whether a recorded event satisfies this condition
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            TriggerCondition::Event(trigger) => trigger.matches(event),
        }
    }

    /// Configured presentation delay, if any
    pub fn schedule_after_seconds(&self) -> Option<u64> {
        match self {
            TriggerCondition::Event(trigger) => trigger.schedule_after_seconds,
        }
    }
}

/// Event-based trigger: name equality plus a conjunction of matchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTrigger {
    /// Event name to match exactly
    pub name: String,
    /// Per-property matchers; all must pass
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyMatcher>,
    /// Present the survey this many seconds after the match instead of
    /// immediately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_after_seconds: Option<u64>,
}

impl EventTrigger {
    /// Name must be equal and every declared matcher must pass; a missing
    /// key fails every non-presence matcher.
    pub fn matches(&self, event: &Event) -> bool {
        if event.name != self.name {
            return false;
        }
        self.properties
            .iter()
            .all(|(key, matcher)| matcher.matches(event.properties.get(key)))
    }
}

/// Shape of the answer a survey collects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurveyResponse {
    /// Pick one of a fixed set of options
    Options { options: Vec<String> },
    /// Free-form text
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
    /// Options plus a free-form field
    Combined {
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
}

/// Payload for the host's re-engagement notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
}
