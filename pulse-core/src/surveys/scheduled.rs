//! Durable scheduling of delayed survey presentations
//!
//! A rule with a presentation delay does not show immediately; it leaves a
//! scheduled entry behind so the survey survives a process exit and can be
//! presented (or re-armed) when the app comes back. One JSON list per user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::storage::{StorageLayout, user_folders};

/// A survey waiting for its presentation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSurvey {
    /// Rule that matched
    pub rule_id: String,
    /// User the session belonged to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session in which the trigger fired
    pub session_id: String,
    /// When the trigger matched
    pub scheduled_at: DateTime<Utc>,
    /// When the survey becomes due
    pub trigger_at: DateTime<Utc>,
}

impl ScheduledSurvey {
    /// Whether the presentation time has arrived
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.trigger_at
    }
}

/// File-backed scheduled survey state, one JSON list per user
pub struct ScheduledSurveyStore {
    layout: StorageLayout,
}

impl ScheduledSurveyStore {
    /// Create a store over the given layout
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Schedule a rule for later presentation.
    ///
    /// At most one entry exists per (rule, session): an existing one is
    /// replaced, taking the new trigger time.
    pub async fn schedule_for_later(
        &self,
        rule_id: &str,
        user_id: Option<&str>,
        session_id: &str,
        delay: Duration,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.read_entries(user_id).await;
        entries.retain(|e| !(e.rule_id == rule_id && e.session_id == session_id));
        entries.push(ScheduledSurvey {
            rule_id: rule_id.to_string(),
            user_id: user_id.map(String::from),
            session_id: session_id.to_string(),
            scheduled_at: now,
            trigger_at: now
                .checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        });
        self.write_entries(user_id, &entries).await;
    }

    /// Entries of one session that are not yet due
    pub async fn pending_surveys(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<ScheduledSurvey> {
        self.read_entries(user_id)
            .await
            .into_iter()
            .filter(|e| e.session_id == session_id && !e.is_due(now))
            .collect()
    }

    /// Entries of one session whose time has arrived
    pub async fn triggered_surveys(
        &self,
        user_id: Option<&str>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<ScheduledSurvey> {
        self.read_entries(user_id)
            .await
            .into_iter()
            .filter(|e| e.session_id == session_id && e.is_due(now))
            .collect()
    }

    /// A user's not-yet-due entries across all sessions
    pub async fn all_pending(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<ScheduledSurvey> {
        self.read_entries(user_id)
            .await
            .into_iter()
            .filter(|e| !e.is_due(now))
            .collect()
    }

    /// A user's due entries across all sessions
    pub async fn all_triggered(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<ScheduledSurvey> {
        self.read_entries(user_id)
            .await
            .into_iter()
            .filter(|e| e.is_due(now))
            .collect()
    }

    /// Delete one (rule, session) entry, if present
    pub async fn remove(&self, rule_id: &str, user_id: Option<&str>, session_id: &str) {
        let mut entries = self.read_entries(user_id).await;
        let before = entries.len();
        entries.retain(|e| !(e.rule_id == rule_id && e.session_id == session_id));
        if entries.len() != before {
            self.write_entries(user_id, &entries).await;
        }
    }

    /// Purge entries scheduled before the cutoff, for every user,
    /// regardless of whether they already became due. Returns how many
    /// were deleted.
    pub async fn cleanup_old(&self, older_than: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for folder in user_folders(&self.layout).await {
            let mut entries = self.read_entries(Some(&folder)).await;
            let before = entries.len();
            entries.retain(|e| e.scheduled_at >= older_than);
            let dropped = before - entries.len();
            if dropped > 0 {
                self.write_entries(Some(&folder), &entries).await;
                removed += dropped;
            }
        }
        if removed > 0 {
            debug!(removed, "Purged aged scheduled surveys");
        }
        removed
    }

    /// Read the entry list, skipping malformed elements.
    ///
    /// An unreadable file degrades to an empty list.
    async fn read_entries(&self, user_id: Option<&str>) -> Vec<ScheduledSurvey> {
        let path = self.layout.scheduled_file(user_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            // Not created yet
            Err(_) => return Vec::new(),
        };

        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Scheduled surveys unreadable, treating as empty");
                return Vec::new();
            }
        };

        let Some(list) = value.as_array() else {
            warn!(path = %path.display(), "Scheduled surveys file is not a list, treating as empty");
            return Vec::new();
        };

        let mut entries = Vec::new();
        for raw in list {
            match serde_json::from_value::<ScheduledSurvey>(raw.clone()) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed scheduled survey");
                }
            }
        }
        entries
    }

    async fn write_entries(&self, user_id: Option<&str>, entries: &[ScheduledSurvey]) {
        if let Err(e) = self.try_write(user_id, entries).await {
            warn!(error = %e, "Failed to persist scheduled surveys");
        }
    }

    async fn try_write(
        &self,
        user_id: Option<&str>,
        entries: &[ScheduledSurvey],
    ) -> Result<(), StoreError> {
        let path = self.layout.scheduled_file(user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&path, content).await?;
        Ok(())
    }
}
