//! Retention policy and eviction planning
//!
//! Selection is a pure function over the listed sessions so the rules can
//! be tested without touching the filesystem; the store executes the plan.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use pulse_paths::sanitize_user_id;

use super::Session;

/// Limits on how much session data is kept
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Sessions started longer ago than this are deleted
    pub max_age: Option<Duration>,
    /// Per user, only this many of the newest sessions are kept
    pub max_sessions_per_user: Option<usize>,
    /// Run eviction automatically when a session starts
    pub automatic_cleanup_enabled: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: None,
            max_sessions_per_user: None,
            automatic_cleanup_enabled: true,
        }
    }
}

/// Decide which sessions the policy evicts.
///
/// The current session is immune: it is neither evicted by age nor counted
/// toward the per-user cap. The age rule runs first; the count rule then
/// keeps the newest `max_sessions_per_user` survivors per user and evicts
/// the rest. Users are bucketed by their storage folder, so ids that
/// sanitize to the same folder share one cap.
pub fn eviction_plan(
    sessions: &[Session],
    policy: &RetentionPolicy,
    current_session_id: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Session> {
    let mut evict = Vec::new();
    let mut survivors: Vec<&Session> = Vec::new();

    for session in sessions {
        if current_session_id.is_some_and(|id| session.id == id) {
            continue;
        }
        let expired = policy
            .max_age
            .is_some_and(|max_age| session.started_at < now - max_age);
        if expired {
            evict.push(session.clone());
        } else {
            survivors.push(session);
        }
    }

    if let Some(max) = policy.max_sessions_per_user {
        let mut by_user: BTreeMap<String, Vec<&Session>> = BTreeMap::new();
        for session in survivors {
            by_user
                .entry(sanitize_user_id(session.user_id.as_deref()))
                .or_default()
                .push(session);
        }

        for group in by_user.values_mut() {
            group.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            for session in group.iter().skip(max) {
                evict.push((*session).clone());
            }
        }
    }

    evict
}
