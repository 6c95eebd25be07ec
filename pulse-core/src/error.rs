//! Error types for pulse-core
//!
//! The public recording and survey surface never returns these to the host:
//! store failures degrade to no-ops or empty reads at the call site. The
//! types exist so store internals can use `?` and so the degradation points
//! have something structured to log.

use thiserror::Error;

/// Top-level error type for pulse-core
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the persisted session/event/survey stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from survey rule configuration parsing
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid survey configuration: {0}")]
    InvalidJson(#[source] serde_json::Error),
}
