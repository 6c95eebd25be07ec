//! Recorder facade with fire-and-forget semantics
//!
//! The `Recorder` is the only entry point hosts use. Every mutation goes
//! through one unbounded command queue drained by a single worker task that
//! owns the session coordinator, so calls are applied in submission order
//! without any locking. Recording is non-blocking; session operations and
//! queries await a reply through the same queue and therefore observe every
//! earlier call.

use std::path::{Path, PathBuf};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, trace, warn};

use crate::config::RecorderConfig;
use crate::events::{Event, EventProperties};
use crate::session::{Session, SessionCoordinator, SessionLifecycleEvent};
use crate::storage::StorageLayout;

/// Messages sent to the background worker task
#[derive(Debug)]
enum RecorderCommand {
    /// Record an event into the current session
    Record {
        name: String,
        properties: EventProperties,
    },
    /// Start a session, ending any active one first
    StartSession {
        user_id: Option<String>,
        metadata: Option<EventProperties>,
        reply: oneshot::Sender<Session>,
    },
    /// End the current session
    EndSession {
        reply: oneshot::Sender<Option<Session>>,
    },
    /// The current session, if any
    CurrentSession {
        reply: oneshot::Sender<Option<Session>>,
    },
    /// Events recorded into the current session
    EventsInCurrentSession { reply: oneshot::Sender<Vec<Event>> },
    /// Every stored event
    AllEvents { reply: oneshot::Sender<Vec<Event>> },
    /// Every stored session
    ListAllSessions { reply: oneshot::Sender<Vec<Session>> },
    /// One user's sessions
    ListSessionsForUser {
        user_id: Option<String>,
        reply: oneshot::Sender<Vec<Session>>,
    },
    /// One session's events
    EventsForSession {
        session_id: String,
        reply: oneshot::Sender<Vec<Event>>,
    },
    /// Run retention eviction now
    ApplyRetentionPolicy { reply: oneshot::Sender<usize> },
    /// Wipe all persisted data
    ClearAll { reply: oneshot::Sender<bool> },
    /// Barrier: resolves once everything enqueued earlier is processed
    Flush { reply: oneshot::Sender<()> },
    /// Stop the worker task
    Shutdown,
}

/// Host-facing telemetry recorder
///
/// Construct once at process start, inside a tokio runtime, and share by
/// `Arc`. Dropping the last handle stops the worker.
pub struct Recorder {
    tx: mpsc::UnboundedSender<RecorderCommand>,
    event_tx: broadcast::Sender<Event>,
    lifecycle_tx: broadcast::Sender<SessionLifecycleEvent>,
    data_dir: PathBuf,
}

impl Recorder {
    /// Create a recorder and spawn its worker task.
    ///
    /// Storage is created lazily on first write, so construction is cheap.
    pub fn new(config: RecorderConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(config.channel_capacity);
        let (lifecycle_tx, _) = broadcast::channel(config.channel_capacity);

        let worker = RecorderWorker {
            coordinator: SessionCoordinator::new(
                StorageLayout::new(&config.data_dir),
                config.retention.clone(),
            ),
            event_tx: event_tx.clone(),
            lifecycle_tx: lifecycle_tx.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            event_tx,
            lifecycle_tx,
            data_dir: config.data_dir,
        }
    }

    /// Root of the persisted data tree
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Record an event. Non-blocking; the write happens on the worker.
    ///
    /// Call order is preserved end to end: events are persisted and
    /// broadcast in the order `record` was called.
    pub fn record(&self, name: impl Into<String>, properties: EventProperties) {
        let command = RecorderCommand::Record {
            name: name.into(),
            properties,
        };
        if self.tx.send(command).is_err() {
            warn!("Recorder worker unavailable, dropping event");
        }
    }

    /// Start a session, ending any active one first.
    ///
    /// If the worker is already gone a detached session record is returned
    /// so callers never observe a failure.
    pub async fn start_session(
        &self,
        user_id: Option<String>,
        metadata: Option<EventProperties>,
    ) -> Session {
        let (reply, rx) = oneshot::channel();
        let command = RecorderCommand::StartSession {
            user_id: user_id.clone(),
            metadata: metadata.clone(),
            reply,
        };
        if self.tx.send(command).is_ok()
            && let Ok(session) = rx.await
        {
            return session;
        }
        warn!("Recorder worker unavailable, returning detached session");
        Session::new(user_id, metadata)
    }

    /// End the current session, returning its final record
    pub async fn end_session(&self) -> Option<Session> {
        self.query(|reply| RecorderCommand::EndSession { reply })
            .await
    }

    /// The current session, if any
    pub async fn current_session(&self) -> Option<Session> {
        self.query(|reply| RecorderCommand::CurrentSession { reply })
            .await
    }

    /// Events recorded into the current session so far
    pub async fn events_in_current_session(&self) -> Vec<Event> {
        self.query(|reply| RecorderCommand::EventsInCurrentSession { reply })
            .await
    }

    /// Every stored event
    pub async fn all_events(&self) -> Vec<Event> {
        self.query(|reply| RecorderCommand::AllEvents { reply })
            .await
    }

    /// Every stored session, ordered by start time ascending
    pub async fn list_all_sessions(&self) -> Vec<Session> {
        self.query(|reply| RecorderCommand::ListAllSessions { reply })
            .await
    }

    /// One user's sessions, ordered by start time ascending
    pub async fn list_sessions_for_user(&self, user_id: Option<String>) -> Vec<Session> {
        self.query(|reply| RecorderCommand::ListSessionsForUser { user_id, reply })
            .await
    }

    /// One session's events, looked up across all users
    pub async fn events_for_session(&self, session_id: impl Into<String>) -> Vec<Event> {
        let session_id = session_id.into();
        self.query(|reply| RecorderCommand::EventsForSession { session_id, reply })
            .await
    }

    /// Run retention eviction now; returns how many sessions were deleted
    pub async fn apply_retention_policy(&self) -> usize {
        self.query(|reply| RecorderCommand::ApplyRetentionPolicy { reply })
            .await
    }

    /// Wipe all persisted data; returns whether a session was active
    pub async fn clear_all(&self) -> bool {
        self.query(|reply| RecorderCommand::ClearAll { reply }).await
    }

    /// Wait until everything enqueued so far has been processed
    pub async fn flush(&self) {
        self.query(|reply| RecorderCommand::Flush { reply }).await
    }

    /// Drain the queue and stop the worker.
    ///
    /// Anything enqueued after this call is dropped.
    pub async fn shutdown(&self) {
        self.flush().await;
        let _ = self.tx.send(RecorderCommand::Shutdown);
    }

    /// Subscribe to recorded events.
    ///
    /// No replay: the receiver only sees events recorded after this call.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to session lifecycle transitions. No replay.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<SessionLifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    /// Send a command and await its reply, degrading to the default when
    /// the worker is gone.
    async fn query<T: Default>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RecorderCommand,
    ) -> T {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(make(reply)).is_ok()
            && let Ok(value) = rx.await
        {
            return value;
        }
        T::default()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.tx.send(RecorderCommand::Shutdown);
    }
}

/// Single consumer of the command queue; owns the coordinator
struct RecorderWorker {
    coordinator: SessionCoordinator,
    event_tx: broadcast::Sender<Event>,
    lifecycle_tx: broadcast::Sender<SessionLifecycleEvent>,
}

impl RecorderWorker {
    /// Drain commands until shutdown or every sender is gone
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RecorderCommand>) {
        info!("Recorder worker started");

        while let Some(command) = rx.recv().await {
            match command {
                RecorderCommand::Shutdown => {
                    info!("Recorder worker received shutdown signal");
                    break;
                }
                command => self.handle(command).await,
            }
        }

        info!("Recorder worker stopped");
    }

    async fn handle(&mut self, command: RecorderCommand) {
        match command {
            RecorderCommand::Record { name, properties } => {
                trace!(event = %name, "Recording event");
                let (event, implicit) = self.coordinator.record(name, properties).await;
                // An implicitly started session is announced before the
                // event that caused it
                if let Some(session) = implicit {
                    let _ = self
                        .lifecycle_tx
                        .send(SessionLifecycleEvent::SessionStarted { session });
                }
                let _ = self.event_tx.send(event);
            }
            RecorderCommand::StartSession {
                user_id,
                metadata,
                reply,
            } => {
                let (session, displaced) = self.coordinator.start_session(user_id, metadata).await;
                if let Some(previous) = displaced {
                    let _ = self.lifecycle_tx.send(SessionLifecycleEvent::SessionEnded {
                        session: Some(previous),
                    });
                }
                let _ = self.lifecycle_tx.send(SessionLifecycleEvent::SessionStarted {
                    session: session.clone(),
                });
                let _ = reply.send(session);
            }
            RecorderCommand::EndSession { reply } => {
                let ended = self.coordinator.end_session().await;
                if let Some(session) = ended.clone() {
                    let _ = self.lifecycle_tx.send(SessionLifecycleEvent::SessionEnded {
                        session: Some(session),
                    });
                }
                let _ = reply.send(ended);
            }
            RecorderCommand::CurrentSession { reply } => {
                let _ = reply.send(self.coordinator.current_session().cloned());
            }
            RecorderCommand::EventsInCurrentSession { reply } => {
                let _ = reply.send(self.coordinator.events_in_current_session().await);
            }
            RecorderCommand::AllEvents { reply } => {
                let _ = reply.send(self.coordinator.all_events().await);
            }
            RecorderCommand::ListAllSessions { reply } => {
                let _ = reply.send(self.coordinator.list_all_sessions().await);
            }
            RecorderCommand::ListSessionsForUser { user_id, reply } => {
                let _ = reply.send(
                    self.coordinator
                        .list_sessions_for_user(user_id.as_deref())
                        .await,
                );
            }
            RecorderCommand::EventsForSession { session_id, reply } => {
                let _ = reply.send(self.coordinator.events_for_session(&session_id).await);
            }
            RecorderCommand::ApplyRetentionPolicy { reply } => {
                let _ = reply.send(
                    self.coordinator
                        .apply_retention_policy(chrono::Utc::now())
                        .await,
                );
            }
            RecorderCommand::ClearAll { reply } => {
                let had_current = self.coordinator.clear_all().await;
                // The session record is gone along with everything else, so
                // the end notification carries no session
                if had_current {
                    let _ = self
                        .lifecycle_tx
                        .send(SessionLifecycleEvent::SessionEnded { session: None });
                }
                let _ = reply.send(had_current);
            }
            RecorderCommand::Flush { reply } => {
                let _ = reply.send(());
            }
            RecorderCommand::Shutdown => {}
        }
    }
}
