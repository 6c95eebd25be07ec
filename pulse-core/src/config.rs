//! Configuration for the recorder and trigger engine

use std::path::PathBuf;

use crate::session::RetentionPolicy;
use crate::surveys::rules::SurveyConfig;

/// Configuration for a [`Recorder`](crate::recorder::Recorder) instance
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Root of the persisted data tree
    pub data_dir: PathBuf,
    /// Limits on stored session data
    pub retention: RetentionPolicy,
    /// Capacity of the broadcast channels handed to subscribers
    pub channel_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            data_dir: pulse_paths::data_dir(),
            retention: RetentionPolicy::default(),
            channel_capacity: 256,
        }
    }
}

/// Configuration for the trigger engine
#[derive(Debug, Clone, Default)]
pub struct TriggerEngineConfig {
    /// Active rule set, evaluated in order
    pub surveys: SurveyConfig,
    /// Debug behavior switches
    pub debug: DebugOptions,
}

/// Debug switches for exercising surveys without real gating state
///
/// Meant for development builds. Bypass also suppresses gating writes, so
/// repeatedly triggering a survey in a debug session leaves no trace in
/// the real gating history.
#[derive(Debug, Clone, Default)]
pub struct DebugOptions {
    /// Skip gating and once-per-session checks entirely
    pub bypass_gating: bool,
    /// Replace configured presentation delays with this many seconds
    pub delay_override_seconds: Option<u64>,
    /// Replace configured cooldowns with this many seconds
    pub cooldown_override_seconds: Option<u64>,
}
