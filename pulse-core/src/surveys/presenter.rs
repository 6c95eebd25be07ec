//! Presentation boundary between the engine and the host UI
//!
//! The engine never renders anything. When a rule fires it hands the host
//! a [`SurveyPrompt`] through the [`SurveyPresenter`] trait; the prompt
//! carries a one-shot [`SurveyResponder`] the UI uses to report what the
//! user did.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::engine::EngineCommand;
use super::rules::SurveyRule;

/// What the user did with a presented survey
#[derive(Debug, Clone, PartialEq)]
pub enum SurveyOutcome {
    /// Picked one of the offered options
    OptionSelected(String),
    /// Submitted free-form text
    TextSubmitted(String),
    /// Closed the prompt without answering
    Dismissed,
}

/// Everything the host UI needs to show one survey
#[derive(Debug)]
pub struct SurveyPrompt {
    /// The rule being presented
    pub rule: SurveyRule,
    /// Reply channel; consume exactly once
    pub responder: SurveyResponder,
}

/// One-shot reply channel back to the trigger engine
///
/// The methods consume the responder, so a presentation can produce at
/// most one outcome.
#[derive(Debug)]
pub struct SurveyResponder {
    rule_id: String,
    user_id: Option<String>,
    session_id: String,
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl SurveyResponder {
    pub(crate) fn new(
        rule_id: String,
        user_id: Option<String>,
        session_id: String,
        tx: mpsc::UnboundedSender<EngineCommand>,
    ) -> Self {
        Self {
            rule_id,
            user_id,
            session_id,
            tx,
        }
    }

    /// Id of the rule this responder belongs to
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// The user picked an option
    pub fn select_option(self, option: impl Into<String>) {
        self.send(SurveyOutcome::OptionSelected(option.into()));
    }

    /// The user submitted text
    pub fn submit_text(self, text: impl Into<String>) {
        self.send(SurveyOutcome::TextSubmitted(text.into()));
    }

    /// The user closed the prompt without answering
    pub fn dismiss(self) {
        self.send(SurveyOutcome::Dismissed);
    }

    fn send(self, outcome: SurveyOutcome) {
        // The engine may already be gone during shutdown; the outcome is
        // dropped then.
        let _ = self.tx.send(EngineCommand::Outcome {
            rule_id: self.rule_id,
            user_id: self.user_id,
            session_id: self.session_id,
            outcome,
        });
    }
}

/// Host-side survey UI
///
/// `present` should return promptly; the user's reaction arrives later
/// through the responder, not as a return value.
#[async_trait]
pub trait SurveyPresenter: Send + Sync {
    /// Show the survey to the user
    async fn present(&self, prompt: SurveyPrompt);
}
