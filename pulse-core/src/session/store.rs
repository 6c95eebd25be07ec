//! File-backed session persistence
//!
//! One directory per session under its user's subtree, holding the
//! `session.json` record and the session's event log. The store is
//! best-effort throughout: writes degrade to warnings, reads and listings
//! degrade to empty results, and a malformed record never hides its
//! neighbors.

use std::path::Path;

use tokio::fs;
use tracing::warn;

use crate::error::StoreError;
use crate::events::{Event, EventLog};
use crate::storage::{SESSION_FILE, StorageLayout, user_folders};

use super::Session;

/// File-backed storage for sessions and their event logs
pub struct SessionStore {
    layout: StorageLayout,
}

impl SessionStore {
    /// Create a store over the given layout
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// The layout this store writes through
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// The event log belonging to a session
    pub fn event_log(&self, session: &Session) -> EventLog {
        EventLog::new(
            self.layout
                .events_file(session.user_id.as_deref(), &session.id),
        )
    }

    /// Persist a session record, creating its directory if needed
    pub async fn save(&self, session: &Session) {
        if let Err(e) = self.try_save(session).await {
            warn!(session_id = %session.id, error = %e, "Failed to persist session");
        }
    }

    /// Load one session record; `None` when missing or unreadable
    pub async fn load(&self, user_id: Option<&str>, session_id: &str) -> Option<Session> {
        let path = self.layout.session_file(user_id, session_id);
        Self::read_session_file(&path).await
    }

    /// All sessions of one user, ordered by start time ascending
    pub async fn list_sessions_for_user(&self, user_id: Option<&str>) -> Vec<Session> {
        let mut sessions = self.sessions_in_dir(&self.layout.sessions_dir(user_id)).await;
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Every session of every user, ordered by start time ascending
    pub async fn list_all_sessions(&self) -> Vec<Session> {
        let mut sessions = Vec::new();
        for folder in user_folders(&self.layout).await {
            sessions.extend(
                self.sessions_in_dir(&self.layout.sessions_dir(Some(&folder)))
                    .await,
            );
        }
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Events of one session, found by scanning every user's subtree
    pub async fn events_for_session(&self, session_id: &str) -> Vec<Event> {
        for folder in user_folders(&self.layout).await {
            let dir = self.layout.session_dir(Some(&folder), session_id);
            if dir.is_dir() {
                return EventLog::new(self.layout.events_file(Some(&folder), session_id))
                    .read_all()
                    .await;
            }
        }
        Vec::new()
    }

    /// Remove a session directory (record and events). Idempotent.
    pub async fn delete_session(&self, user_id: Option<&str>, session_id: &str) {
        let dir = self.layout.session_dir(user_id, session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to delete session");
            }
        }
    }

    /// Remove every user's data tree. Idempotent.
    pub async fn clear_all(&self) {
        match fs::remove_dir_all(self.layout.users_dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, "Failed to clear session data");
            }
        }
    }

    async fn try_save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self
            .layout
            .session_file(session.user_id.as_deref(), &session.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&path, content).await?;
        Ok(())
    }

    async fn sessions_in_dir(&self, dir: &Path) -> Vec<Session> {
        let mut sessions = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return sessions,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let file = entry.path().join(SESSION_FILE);
            if let Some(session) = Self::read_session_file(&file).await {
                sessions.push(session);
            }
        }

        sessions
    }

    async fn read_session_file(path: &Path) -> Option<Session> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(_) => return None,
        };
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed session record");
                None
            }
        }
    }
}
