//! On-disk layout of the pulse data directory
//!
//! All stores share one tree rooted at the data directory, partitioned by
//! sanitized user id:
//!
//! ```text
//! users/<user>/sessions/<session-id>/session.json
//! users/<user>/sessions/<session-id>/events.jsonl
//! users/<user>/surveys/gating.json
//! users/<user>/surveys/scheduled.json
//! ```

use std::path::{Path, PathBuf};

use pulse_paths::sanitize_user_id;

/// Session metadata file name
pub(crate) const SESSION_FILE: &str = "session.json";
/// Per-session event log file name
pub(crate) const EVENTS_FILE: &str = "events.jsonl";

/// Path construction for the persisted data tree
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Create a layout rooted at the given data directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all per-user subtrees
    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    /// Per-user directory; `None` maps to the `anon` folder
    pub fn user_dir(&self, user_id: Option<&str>) -> PathBuf {
        self.users_dir().join(sanitize_user_id(user_id))
    }

    /// Directory holding a user's sessions
    pub fn sessions_dir(&self, user_id: Option<&str>) -> PathBuf {
        self.user_dir(user_id).join("sessions")
    }

    /// Directory for one session
    pub fn session_dir(&self, user_id: Option<&str>, session_id: &str) -> PathBuf {
        self.sessions_dir(user_id).join(session_id)
    }

    /// Session metadata file
    pub fn session_file(&self, user_id: Option<&str>, session_id: &str) -> PathBuf {
        self.session_dir(user_id, session_id).join(SESSION_FILE)
    }

    /// Per-session event log file
    pub fn events_file(&self, user_id: Option<&str>, session_id: &str) -> PathBuf {
        self.session_dir(user_id, session_id).join(EVENTS_FILE)
    }

    /// Directory holding a user's survey state
    pub fn surveys_dir(&self, user_id: Option<&str>) -> PathBuf {
        self.user_dir(user_id).join("surveys")
    }

    /// Gating record map for a user
    pub fn gating_file(&self, user_id: Option<&str>) -> PathBuf {
        self.surveys_dir(user_id).join("gating.json")
    }

    /// Scheduled survey list for a user
    pub fn scheduled_file(&self, user_id: Option<&str>) -> PathBuf {
        self.surveys_dir(user_id).join("scheduled.json")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(pulse_paths::data_dir())
    }
}

/// Folder names under `users/`.
///
/// Folder names are already sanitized, so feeding one back through the
/// layout as a user id resolves the same paths. A missing tree means
/// nothing was recorded yet and yields no folders.
pub(crate) async fn user_folders(layout: &StorageLayout) -> Vec<String> {
    let mut folders = Vec::new();
    let mut entries = match tokio::fs::read_dir(layout.users_dir()).await {
        Ok(entries) => entries,
        Err(_) => return folders,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(name) = entry.file_name().to_str() {
            folders.push(name.to_string());
        }
    }
    folders
}
