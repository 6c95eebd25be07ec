//! Event model and per-session event storage

pub mod log;
pub mod types;

// Re-export key types for convenience
pub use log::EventLog;
pub use types::{Event, EventProperties, EventValue};
