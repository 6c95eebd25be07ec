//! Shared test utilities for pulse-core integration tests
//!
//! Note: Some helpers may appear unused because they're only used in
//! specific test files and each test binary is checked independently.

use std::path::Path;
use std::sync::Arc;

use pulse_core::{
    Recorder, RecorderConfig, RetentionPolicy, SurveyConfig, SurveyPresenter, SurveyPrompt,
    TriggerEngine, TriggerEngineConfig,
};
use tokio::sync::mpsc;

/// Presenter that forwards every prompt into a channel for inspection
#[allow(dead_code)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<SurveyPrompt>,
}

#[async_trait::async_trait]
impl SurveyPresenter for ChannelPresenter {
    async fn present(&self, prompt: SurveyPrompt) {
        let _ = self.tx.send(prompt);
    }
}

/// A presenter and the receiving end of its prompt channel
#[allow(dead_code)]
pub fn channel_presenter() -> (Arc<ChannelPresenter>, mpsc::UnboundedReceiver<SurveyPrompt>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelPresenter { tx }), rx)
}

/// A recorder rooted at the given directory, with automatic cleanup off so
/// tests control retention explicitly
#[allow(dead_code)]
pub fn create_recorder(data_dir: &Path) -> Arc<Recorder> {
    Arc::new(Recorder::new(RecorderConfig {
        data_dir: data_dir.to_path_buf(),
        retention: RetentionPolicy {
            automatic_cleanup_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }))
}

/// Engine config parsed from a rule document, with default debug options
#[allow(dead_code)]
pub fn engine_config(json: &str) -> TriggerEngineConfig {
    TriggerEngineConfig {
        surveys: SurveyConfig::from_json(json).expect("valid rule config"),
        ..Default::default()
    }
}

/// Spawn an engine over the recorder, returning the engine and its prompts
#[allow(dead_code)]
pub fn spawn_engine(
    recorder: &Arc<Recorder>,
    json: &str,
) -> (TriggerEngine, mpsc::UnboundedReceiver<SurveyPrompt>) {
    let (presenter, prompts) = channel_presenter();
    let engine = TriggerEngine::spawn(recorder.clone(), presenter, engine_config(json));
    (engine, prompts)
}
