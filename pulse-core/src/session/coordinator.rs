//! Session lifecycle state machine
//!
//! Owns the "current session" pointer and every transition around it:
//! explicit start/end, implicit starts triggered by recording, retention
//! cleanup, and full data clears. The recorder worker task is the only
//! caller, so no locking happens here.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::events::{Event, EventProperties};
use crate::storage::StorageLayout;

use super::retention::{RetentionPolicy, eviction_plan};
use super::store::SessionStore;
use super::types::Session;

/// Coordinates session state over the persistent store
pub struct SessionCoordinator {
    store: SessionStore,
    policy: RetentionPolicy,
    current: Option<Session>,
}

impl SessionCoordinator {
    /// Create a coordinator with no current session
    pub fn new(layout: StorageLayout, policy: RetentionPolicy) -> Self {
        Self {
            store: SessionStore::new(layout),
            policy,
            current: None,
        }
    }

    /// The current session, if one is active
    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Start a new session, making it current.
    ///
    /// An already active session is ended first and returned as the second
    /// tuple element so observers can be told about both transitions. When
    /// automatic cleanup is enabled, retention runs before the new session
    /// is created, so the newcomer is never considered for eviction.
    pub async fn start_session(
        &mut self,
        user_id: Option<String>,
        metadata: Option<EventProperties>,
    ) -> (Session, Option<Session>) {
        let displaced = self.end_session().await;

        if self.policy.automatic_cleanup_enabled {
            self.apply_retention_policy(Utc::now()).await;
        }

        let session = Session::new(user_id, metadata);
        self.store.save(&session).await;
        info!(
            session_id = %session.id,
            user = session.user_id.as_deref().unwrap_or("anon"),
            "Session started"
        );
        self.current = Some(session.clone());

        (session, displaced)
    }

    /// End the current session, if any.
    ///
    /// Stamps the end time and persists the record; the data stays on disk.
    pub async fn end_session(&mut self) -> Option<Session> {
        let mut session = self.current.take()?;
        session.end(Utc::now());
        self.store.save(&session).await;
        info!(session_id = %session.id, "Session ended");
        Some(session)
    }

    /// Record an event into the current session.
    ///
    /// When no session is active, an anonymous one is started implicitly
    /// and returned as the second tuple element so lifecycle observers see
    /// the start before the event.
    pub async fn record(
        &mut self,
        name: impl Into<String>,
        properties: EventProperties,
    ) -> (Event, Option<Session>) {
        let (current, implicit) = match &self.current {
            Some(session) => (session.clone(), None),
            None => {
                let (session, _) = self.start_session(None, None).await;
                (session.clone(), Some(session))
            }
        };

        let event = Event::new(name, properties, &current.id, current.user_id.clone());
        self.store.event_log(&current).append(&event).await;

        (event, implicit)
    }

    /// Run retention eviction now; returns how many sessions were deleted
    pub async fn apply_retention_policy(&self, now: DateTime<Utc>) -> usize {
        let sessions = self.store.list_all_sessions().await;
        let current_id = self.current.as_ref().map(|s| s.id.clone());
        let plan = eviction_plan(&sessions, &self.policy, current_id.as_deref(), now);

        for session in &plan {
            self.store
                .delete_session(session.user_id.as_deref(), &session.id)
                .await;
        }
        if !plan.is_empty() {
            info!(deleted = plan.len(), "Retention cleanup removed sessions");
        }

        plan.len()
    }

    /// Events recorded into the current session so far
    pub async fn events_in_current_session(&self) -> Vec<Event> {
        match &self.current {
            Some(session) => self.store.event_log(session).read_all().await,
            None => Vec::new(),
        }
    }

    /// Every stored event, grouped by session in start order
    pub async fn all_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for session in self.store.list_all_sessions().await {
            events.extend(self.store.event_log(&session).read_all().await);
        }
        events
    }

    /// Every stored session, ordered by start time ascending
    pub async fn list_all_sessions(&self) -> Vec<Session> {
        self.store.list_all_sessions().await
    }

    /// One user's sessions, ordered by start time ascending
    pub async fn list_sessions_for_user(&self, user_id: Option<&str>) -> Vec<Session> {
        self.store.list_sessions_for_user(user_id).await
    }

    /// Events of one session, looked up across all users
    pub async fn events_for_session(&self, session_id: &str) -> Vec<Event> {
        self.store.events_for_session(session_id).await
    }

    /// Wipe all persisted data and forget the current session.
    ///
    /// Returns whether a session was active; its record is gone, so the
    /// caller reports the end without one.
    pub async fn clear_all(&mut self) -> bool {
        let had_current = self.current.take().is_some();
        self.store.clear_all().await;
        info!("All recorded data cleared");
        had_current
    }
}
