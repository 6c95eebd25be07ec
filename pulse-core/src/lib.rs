//! pulse-core: Core library for the pulse in-app telemetry and survey engine
//!
//! This crate provides the foundational components for pulse:
//!
//! - **Event recording** - [`Recorder`] for fire-and-forget event capture into
//!   per-session JSONL logs
//! - **Session management** - [`SessionCoordinator`] and [`RetentionPolicy`] for
//!   session lifecycle and storage eviction
//! - **Survey rules** - [`SurveyConfig`] and [`PropertyMatcher`] for the
//!   declarative trigger language
//! - **Survey triggering** - [`TriggerEngine`] for evaluating the live event
//!   stream, with durable gating and delayed presentation
//! - **Presentation seam** - [`SurveyPresenter`] and [`SurveyResponder`] for
//!   handing prompts to the host UI and collecting outcomes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pulse_core::{
//!     EventProperties, Recorder, RecorderConfig, SurveyConfig, SurveyPresenter, SurveyPrompt,
//!     TriggerEngine, TriggerEngineConfig,
//! };
//!
//! struct AutoDismiss;
//!
//! #[async_trait::async_trait]
//! impl SurveyPresenter for AutoDismiss {
//!     async fn present(&self, prompt: SurveyPrompt) {
//!         println!("survey: {}", prompt.rule.title);
//!         prompt.responder.dismiss();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let recorder = Arc::new(Recorder::new(RecorderConfig::default()));
//!     let config = TriggerEngineConfig {
//!         surveys: SurveyConfig::from_json(r#"{"surveys": []}"#).unwrap(),
//!         ..Default::default()
//!     };
//!     let engine = TriggerEngine::spawn(recorder.clone(), Arc::new(AutoDismiss), config);
//!
//!     recorder.start_session(Some("alice".into()), None).await;
//!     recorder.record("checkout_completed", EventProperties::new());
//!
//!     engine.shutdown().await;
//!     recorder.shutdown().await;
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────┐ record()  ┌───────────────┐  event stream  ┌───────────────┐
//! │ Host │──────────▶│   Recorder    │───────────────▶│ TriggerEngine │
//! └──────┘           │ (worker task) │                │ (worker task) │
//!    ▲               └───────┬───────┘                └───────┬───────┘
//!    │                       │ sessions + events              │ gating +
//!    │                       ▼                                ▼ scheduled
//!    │               <data-dir>/users/<user>/...  ◀───────────┘
//!    │                                                        │
//!    └───────────────── SurveyPrompt via SurveyPresenter ◀────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod surveys;

// Re-export key types for convenience
pub use config::{DebugOptions, RecorderConfig, TriggerEngineConfig};
pub use error::{ConfigError, PulseError, StoreError};
pub use events::{Event, EventLog, EventProperties, EventValue};
pub use recorder::Recorder;
pub use session::{
    RetentionPolicy, Session, SessionCoordinator, SessionLifecycleEvent, SessionStore,
    eviction_plan,
};
pub use storage::StorageLayout;
pub use surveys::{
    EVENT_SURVEY_DISMISSED, EVENT_SURVEY_PRESENTED, EVENT_SURVEY_RESPONSE, EventTrigger,
    GatingParams, GatingRecord, GatingStore, MatchAtom, NotificationContent, PROP_ANSWER,
    PROP_ANSWER_KIND, PROP_SURVEY_ID, PropertyMatcher, ScheduledSurvey, ScheduledSurveyStore,
    SurveyConfig, SurveyOutcome, SurveyPresenter, SurveyPrompt, SurveyResponder, SurveyResponse,
    SurveyRule, TriggerCondition, TriggerEngine,
};
