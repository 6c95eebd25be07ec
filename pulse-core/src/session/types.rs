//! Session record and lifecycle notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::EventProperties;

/// A recording session
///
/// Exactly one session is current at a time per recorder instance. The
/// record is mutated exactly once after creation, when `ended_at` is
/// stamped; everything else is fixed at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID v4), never reused
    pub id: String,
    /// User the session belongs to, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Host-supplied metadata captured at start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventProperties>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time, present once the session has ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new active session with a fresh id
    pub fn new(user_id: Option<String>, metadata: Option<EventProperties>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            metadata,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether the session has not ended yet
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Stamp the end time. An already ended session keeps its original end.
    pub fn end(&mut self, now: DateTime<Utc>) {
        if self.ended_at.is_none() {
            self.ended_at = Some(now);
        }
    }
}

/// Session lifecycle notification broadcast to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionLifecycleEvent {
    /// A session became current (explicit or implicit start)
    SessionStarted { session: Session },
    /// The current session went away. `session` carries the ended record,
    /// or `None` when the record was destroyed (data clear).
    SessionEnded { session: Option<Session> },
}
