//! Rule evaluation against the live event stream
//!
//! The engine subscribes to the recorder's event broadcast and evaluates
//! every event against the active rule set, in order. The first rule that
//! matches and passes gating acts; rules that match but are gated yield to
//! later rules. A rule with a presentation delay leaves a durable scheduled
//! entry and an in-process timer; the entry survives restarts and is picked
//! up again on the next resume.
//!
//! All state lives on a single worker task, so evaluation, timer fires,
//! outcome handling and config swaps are serialized without locks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TriggerEngineConfig;
use crate::events::{Event, EventProperties, EventValue};
use crate::recorder::Recorder;
use crate::storage::StorageLayout;

use super::gating::{GatingParams, GatingStore, saturating_seconds};
use super::presenter::{SurveyOutcome, SurveyPresenter, SurveyPrompt, SurveyResponder};
use super::rules::{SurveyConfig, SurveyRule};
use super::scheduled::ScheduledSurveyStore;

/// Event recorded when a survey is presented
pub const EVENT_SURVEY_PRESENTED: &str = "survey_presented";
/// Event recorded when the user answers a survey
pub const EVENT_SURVEY_RESPONSE: &str = "survey_response";
/// Event recorded when the user dismisses a survey without answering
pub const EVENT_SURVEY_DISMISSED: &str = "survey_dismissed";

/// Property carrying the rule id on all synthetic survey events
pub const PROP_SURVEY_ID: &str = "survey_id";
/// Property carrying the answer on response events
pub const PROP_ANSWER: &str = "answer";
/// Property carrying the answer kind ("option" or "text") on response events
pub const PROP_ANSWER_KIND: &str = "answer_kind";

/// Scheduled entries older than this are purged at resume
const SCHEDULED_ENTRY_MAX_AGE_DAYS: i64 = 30;

/// Messages handled by the engine worker
#[derive(Debug)]
pub(crate) enum EngineCommand {
    /// An in-process presentation timer fired
    DelayElapsed {
        rule_id: String,
        user_id: Option<String>,
        session_id: String,
    },
    /// The host UI reported what the user did with a prompt
    Outcome {
        rule_id: String,
        user_id: Option<String>,
        session_id: String,
        outcome: SurveyOutcome,
    },
    /// The host came back to the foreground
    Foreground,
    /// Swap the active rule set
    UpdateConfig(SurveyConfig),
}

/// Survey trigger engine handle
///
/// Spawns a worker task on construction; dropping the handle stops it.
pub struct TriggerEngine {
    tx: mpsc::UnboundedSender<EngineCommand>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TriggerEngine {
    /// Attach an engine to a recorder and start evaluating.
    ///
    /// Scheduled surveys left behind by an earlier run are restored before
    /// any new event is processed.
    pub fn spawn(
        recorder: Arc<Recorder>,
        presenter: Arc<dyn SurveyPresenter>,
        config: TriggerEngineConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let layout = StorageLayout::new(recorder.data_dir());

        let events = recorder.subscribe_events();
        let worker = EngineWorker {
            recorder,
            presenter,
            config,
            gating: GatingStore::new(layout.clone()),
            scheduled: ScheduledSurveyStore::new(layout),
            shown_this_session: HashSet::new(),
            timers: HashMap::new(),
            last_session_id: None,
            tx: tx.clone(),
        };
        let handle = tokio::spawn(worker.run(events, rx, shutdown.clone()));

        Self {
            tx,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Replace the active rule set.
    ///
    /// Applies to events processed after this call. Per-session state and
    /// persisted gating are kept; scheduled entries whose rule disappeared
    /// are dropped when they come due.
    pub fn update_config(&self, surveys: SurveyConfig) {
        let _ = self.tx.send(EngineCommand::UpdateConfig(surveys));
    }

    /// Tell the engine the host is in the foreground again.
    ///
    /// Rechecks the scheduled store, presenting at most one due survey.
    pub fn notify_foreground(&self) {
        let _ = self.tx.send(EngineCommand::Foreground);
    }

    /// Stop the worker and wait for it to finish
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take()
            && handle.await.is_err()
        {
            warn!("Trigger engine worker panicked during shutdown");
        }
    }
}

impl Drop for TriggerEngine {
    fn drop(&mut self) {
        // The worker keeps the recorder alive, so its event stream never
        // closes on its own; cancellation is the stop signal.
        self.shutdown.cancel();
    }
}

/// Single owner of all evaluation state
struct EngineWorker {
    recorder: Arc<Recorder>,
    presenter: Arc<dyn SurveyPresenter>,
    config: TriggerEngineConfig,
    gating: GatingStore,
    scheduled: ScheduledSurveyStore,
    /// Rule ids already presented in the current session
    shown_this_session: HashSet<String>,
    /// In-process delay timers, keyed by (rule, session)
    timers: HashMap<(String, String), JoinHandle<()>>,
    /// Session the engine last saw events for
    last_session_id: Option<String>,
    /// Sender for our own command queue; timers and responders use clones
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineWorker {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<Event>,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        shutdown: CancellationToken,
    ) {
        info!(
            rules = self.config.surveys.surveys.len(),
            "Trigger engine started"
        );
        self.restore_scheduled(Utc::now()).await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(command) = commands.recv() => self.handle_command(command).await,
                result = events.recv() => match result {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Trigger engine lagged behind the event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.abort_timers();
        info!("Trigger engine stopped");
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::DelayElapsed {
                rule_id,
                user_id,
                session_id,
            } => {
                self.timers.remove(&(rule_id.clone(), session_id.clone()));
                self.present_scheduled(&rule_id, user_id, session_id).await;
            }
            EngineCommand::Outcome {
                rule_id,
                user_id,
                session_id,
                outcome,
            } => {
                self.handle_outcome(rule_id, user_id, session_id, outcome)
                    .await;
            }
            EngineCommand::Foreground => {
                debug!("Foreground notification received");
                self.restore_scheduled(Utc::now()).await;
            }
            EngineCommand::UpdateConfig(surveys) => {
                info!(rules = surveys.surveys.len(), "Survey configuration updated");
                self.config.surveys = surveys;
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        self.reset_on_session_change(&event);
        self.evaluate(&event).await;
    }

    /// Per-session state is scoped to one session: a new session id clears
    /// the shown set and kills outstanding delay timers.
    fn reset_on_session_change(&mut self, event: &Event) {
        if self.last_session_id.as_deref() == Some(event.session_id.as_str()) {
            return;
        }
        if self.last_session_id.is_some() {
            debug!(session = %event.session_id, "Session changed, resetting per-session survey state");
        }
        self.last_session_id = Some(event.session_id.clone());
        self.shown_this_session.clear();
        self.abort_timers();
    }

    /// Evaluate one event against the rule set, in order. The first rule
    /// that matches and passes gating acts; gated matches yield to later
    /// rules.
    async fn evaluate(&mut self, event: &Event) {
        let now = Utc::now();
        let mut action: Option<(SurveyRule, Option<Duration>)> = None;

        for rule in &self.config.surveys.surveys {
            if !rule.trigger.matches(event) {
                continue;
            }
            if !self.config.debug.bypass_gating {
                if rule.once_per_session && self.shown_this_session.contains(&rule.id) {
                    continue;
                }
                let params = GatingParams::from_rule(rule, &self.config.debug);
                if !self
                    .gating
                    .can_show(&rule.id, event.user_id.as_deref(), &params, now)
                    .await
                {
                    debug!(rule = %rule.id, "Rule matched but is gated");
                    continue;
                }
            }
            action = Some((rule.clone(), self.effective_delay(rule)));
            break;
        }

        let Some((rule, delay)) = action else {
            return;
        };
        match delay {
            Some(delay) => self.schedule(&rule, event, delay, now).await,
            None => {
                self.present(rule, event.user_id.clone(), event.session_id.clone())
                    .await;
            }
        }
    }

    /// The rule's presentation delay. A zero delay counts as no delay, and
    /// a debug override replaces the value only for rules that configure
    /// one.
    fn effective_delay(&self, rule: &SurveyRule) -> Option<Duration> {
        let configured = rule.trigger.schedule_after_seconds().filter(|secs| *secs > 0)?;
        let seconds = self
            .config
            .debug
            .delay_override_seconds
            .unwrap_or(configured);
        Some(saturating_seconds(seconds))
    }

    /// Persist a delayed presentation and arm its timer. A repeat match
    /// while the entry is still counting down keeps the original deadline.
    async fn schedule(
        &mut self,
        rule: &SurveyRule,
        event: &Event,
        delay: Duration,
        now: DateTime<Utc>,
    ) {
        let user_id = event.user_id.as_deref();
        let pending = self
            .scheduled
            .pending_surveys(user_id, &event.session_id, now)
            .await;
        if pending.iter().any(|entry| entry.rule_id == rule.id) {
            debug!(rule = %rule.id, "Delay already pending, keeping the original deadline");
            return;
        }

        self.scheduled
            .schedule_for_later(&rule.id, user_id, &event.session_id, delay, now)
            .await;
        self.arm_timer(
            rule.id.clone(),
            event.user_id.clone(),
            event.session_id.clone(),
            delay,
        );
        info!(
            rule = %rule.id,
            delay_seconds = delay.num_seconds(),
            "Survey scheduled for later presentation"
        );
    }

    fn arm_timer(
        &mut self,
        rule_id: String,
        user_id: Option<String>,
        session_id: String,
        delay: Duration,
    ) {
        let key = (rule_id.clone(), session_id.clone());
        let tx = self.tx.clone();
        let sleep = delay.to_std().unwrap_or_default();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep).await;
            let _ = tx.send(EngineCommand::DelayElapsed {
                rule_id,
                user_id,
                session_id,
            });
        });
        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    fn abort_timers(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    /// A scheduled entry came due. The entry is consumed by presentation
    /// itself, not by the outcome; an entry whose rule left the config is
    /// dropped silently.
    async fn present_scheduled(
        &mut self,
        rule_id: &str,
        user_id: Option<String>,
        session_id: String,
    ) {
        let Some(rule) = self.config.surveys.rule(rule_id).cloned() else {
            self.scheduled
                .remove(rule_id, user_id.as_deref(), &session_id)
                .await;
            debug!(rule = %rule_id, "Dropping scheduled survey for unconfigured rule");
            return;
        };
        self.scheduled
            .remove(rule_id, user_id.as_deref(), &session_id)
            .await;
        self.present(rule, user_id, session_id).await;
    }

    async fn present(&mut self, rule: SurveyRule, user_id: Option<String>, session_id: String) {
        if !self.config.debug.bypass_gating {
            self.gating
                .mark_shown(&rule.id, user_id.as_deref(), Utc::now())
                .await;
        }
        // The shown set is scoped to the current session; a restored survey
        // from an earlier session does not consume this session's quota
        if rule.once_per_session && self.last_session_id.as_deref() == Some(session_id.as_str()) {
            self.shown_this_session.insert(rule.id.clone());
        }

        let mut props = EventProperties::new();
        props.insert(PROP_SURVEY_ID.into(), EventValue::from(rule.id.as_str()));
        self.recorder.record(EVENT_SURVEY_PRESENTED, props);

        let responder =
            SurveyResponder::new(rule.id.clone(), user_id, session_id, self.tx.clone());
        info!(rule = %rule.id, "Presenting survey");
        self.presenter
            .present(SurveyPrompt { rule, responder })
            .await;
    }

    async fn handle_outcome(
        &mut self,
        rule_id: String,
        user_id: Option<String>,
        session_id: String,
        outcome: SurveyOutcome,
    ) {
        match outcome {
            SurveyOutcome::OptionSelected(answer) => {
                self.record_response(&rule_id, answer, "option");
                self.complete(&rule_id, user_id.as_deref(), &session_id).await;
            }
            SurveyOutcome::TextSubmitted(answer) => {
                self.record_response(&rule_id, answer, "text");
                self.complete(&rule_id, user_id.as_deref(), &session_id).await;
            }
            SurveyOutcome::Dismissed => {
                let mut props = EventProperties::new();
                props.insert(PROP_SURVEY_ID.into(), EventValue::from(rule_id.as_str()));
                self.recorder.record(EVENT_SURVEY_DISMISSED, props);
                debug!(rule = %rule_id, "Survey dismissed");
            }
        }
    }

    fn record_response(&self, rule_id: &str, answer: String, kind: &str) {
        let mut props = EventProperties::new();
        props.insert(PROP_SURVEY_ID.into(), EventValue::from(rule_id));
        props.insert(PROP_ANSWER.into(), EventValue::Text(answer));
        props.insert(PROP_ANSWER_KIND.into(), EventValue::from(kind));
        self.recorder.record(EVENT_SURVEY_RESPONSE, props);
    }

    /// An answered survey never shows again for this user
    async fn complete(&mut self, rule_id: &str, user_id: Option<&str>, session_id: &str) {
        if !self.config.debug.bypass_gating {
            self.gating.mark_completed(rule_id, user_id, Utc::now()).await;
        }
        self.scheduled.remove(rule_id, user_id, session_id).await;
        if let Some(handle) = self
            .timers
            .remove(&(rule_id.to_string(), session_id.to_string()))
        {
            handle.abort();
        }
        info!(rule = %rule_id, "Survey completed");
    }

    /// Resume handling: purge aged entries, then hand at most one survey
    /// back to the user. A due entry is presented immediately; otherwise
    /// the soonest pending entry gets its timer re-armed for the time
    /// remaining.
    async fn restore_scheduled(&mut self, now: DateTime<Utc>) {
        self.scheduled
            .cleanup_old(now - Duration::days(SCHEDULED_ENTRY_MAX_AGE_DAYS))
            .await;

        let Some(session) = self.recorder.current_session().await else {
            return;
        };
        // Events from this session must not reset the state built here
        self.last_session_id = Some(session.id.clone());
        let user_id = session.user_id.as_deref();

        for entry in self.scheduled.all_triggered(user_id, now).await {
            if self.config.surveys.rule(&entry.rule_id).is_none() {
                self.scheduled
                    .remove(&entry.rule_id, user_id, &entry.session_id)
                    .await;
                debug!(rule = %entry.rule_id, "Dropping scheduled survey for unconfigured rule");
                continue;
            }
            info!(rule = %entry.rule_id, "Restoring due survey");
            self.present_scheduled(&entry.rule_id, entry.user_id.clone(), entry.session_id.clone())
                .await;
            return;
        }

        let mut pending = self.scheduled.all_pending(user_id, now).await;
        pending.sort_by_key(|entry| entry.trigger_at);
        for entry in pending {
            if self.config.surveys.rule(&entry.rule_id).is_none() {
                continue;
            }
            let remaining = entry.trigger_at - now;
            debug!(
                rule = %entry.rule_id,
                remaining_seconds = remaining.num_seconds(),
                "Re-arming scheduled survey"
            );
            self.arm_timer(
                entry.rule_id.clone(),
                entry.user_id.clone(),
                entry.session_id.clone(),
                remaining,
            );
            return;
        }
    }
}
