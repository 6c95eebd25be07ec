//! Rule-driven survey triggering
//!
//! Rules describe which events warrant asking the user a question and how
//! often asking is acceptable. The [`TriggerEngine`] evaluates the live
//! event stream against them; [`GatingStore`] and [`ScheduledSurveyStore`]
//! persist the frequency and delay state that has to survive restarts, and
//! [`SurveyPresenter`] is the seam to the host UI.

pub mod engine;
pub mod gating;
pub mod matcher;
pub mod presenter;
pub mod rules;
pub mod scheduled;

pub use engine::{
    EVENT_SURVEY_DISMISSED, EVENT_SURVEY_PRESENTED, EVENT_SURVEY_RESPONSE, PROP_ANSWER,
    PROP_ANSWER_KIND, PROP_SURVEY_ID, TriggerEngine,
};
pub use gating::{GatingParams, GatingRecord, GatingStore};
pub use matcher::{MatchAtom, PropertyMatcher};
pub use presenter::{SurveyOutcome, SurveyPresenter, SurveyPrompt, SurveyResponder};
pub use rules::{
    EventTrigger, NotificationContent, SurveyConfig, SurveyResponse, SurveyRule, TriggerCondition,
};
pub use scheduled::{ScheduledSurvey, ScheduledSurveyStore};
