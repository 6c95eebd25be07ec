//! Append-only JSONL storage for events
//!
//! One JSON object per line, one file per session. Writes are best-effort:
//! telemetry must never take the host down, so I/O failures degrade to
//! warnings and reads tolerate individual corrupt lines.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::error::StoreError;

use super::Event;

/// Append-only JSONL event log
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create a new event log at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single event.
    ///
    /// Best-effort durable write: the entry is flushed before returning, and
    /// failures are logged and swallowed rather than surfaced to the caller.
    /// The parent directory is created lazily on first write.
    pub async fn append(&self, event: &Event) {
        if let Err(e) = self.try_append(event).await {
            warn!(path = %self.path.display(), error = %e, "Failed to append event");
        }
    }

    /// Read every event in append order.
    ///
    /// A malformed line is skipped without discarding the rest of the file.
    /// A missing or unreadable file yields an empty vec.
    pub async fn read_all(&self) -> Vec<Event> {
        if !self.path.exists() {
            return Vec::new();
        }

        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to open event log");
                return Vec::new();
            }
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = Self::parse_line(&line) {
                        events.push(event);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to read event log");
                    break;
                }
            }
        }

        events
    }

    /// Remove the backing file. Idempotent; a missing file is not an error.
    pub async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to clear event log");
            }
        }
    }

    async fn try_append(&self, event: &Event) -> Result<(), StoreError> {
        self.ensure_parent_dir().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        Ok(())
    }

    async fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Parse a single line into an event
    fn parse_line(line: &str) -> Option<Event> {
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Skipping malformed event line");
                None
            }
        }
    }
}
