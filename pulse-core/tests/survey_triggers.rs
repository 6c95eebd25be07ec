//! Survey triggering integration tests
//!
//! Exercises the full recorder-to-presenter pipeline: property matching,
//! frequency gating, durable delayed presentation across restarts, and the
//! one-per-resume restore rule.

mod common;

use std::time::Duration;

use chrono::Utc;
use pulse_core::{
    EVENT_SURVEY_PRESENTED, EVENT_SURVEY_RESPONSE, EventProperties, EventValue, PROP_ANSWER,
    PROP_ANSWER_KIND, PROP_SURVEY_ID, ScheduledSurvey, ScheduledSurveyStore, StorageLayout,
};
use tempfile::TempDir;
use tokio::time::timeout;

/// Wait until the user's scheduled store holds a pending entry
async fn wait_for_pending(store: &ScheduledSurveyStore, user: Option<&str>) -> Vec<ScheduledSurvey> {
    for _ in 0..100 {
        let entries = store.all_pending(user, Utc::now()).await;
        if !entries.is_empty() {
            return entries;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Vec::new()
}

/// A matched checkout triggers the survey, the answer is recorded, and the
/// rule is gated afterwards
#[tokio::test]
async fn checkout_survey_full_journey() {
    const RULES: &str = r#"{"surveys": [{
        "id": "checkout-nps",
        "title": "Quick question",
        "message": "How was checkout?",
        "response": {"type": "options", "options": ["Great", "Okay", "Bad"]},
        "trigger": {"event": {"name": "checkout_completed",
                              "properties": {"amount": {"op": "gt", "value": 50}}}},
        "oncePerSession": false,
        "cooldownSeconds": 86400
    }]}"#;
    let dir = TempDir::new().unwrap();
    let recorder = common::create_recorder(dir.path());
    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);
    recorder.start_session(Some("alice".into()), None).await;

    // Small basket: matcher fails, nothing happens
    let mut props = EventProperties::new();
    props.insert("amount".into(), EventValue::Integer(20));
    recorder.record("checkout_completed", props);
    recorder.flush().await;
    assert!(timeout(Duration::from_millis(300), prompts.recv()).await.is_err());

    // Big basket: survey is presented
    let mut props = EventProperties::new();
    props.insert("amount".into(), EventValue::Integer(80));
    recorder.record("checkout_completed", props);
    let prompt = timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("Timeout waiting for prompt")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "checkout-nps");

    // The answer flows back through the responder into the event log
    let mut events = recorder.subscribe_events();
    prompt.responder.select_option("Great");
    let response = loop {
        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("Timeout waiting for response event")
            .expect("Channel closed");
        if event.name == EVENT_SURVEY_RESPONSE {
            break event;
        }
    };
    assert_eq!(
        response.properties.get(PROP_SURVEY_ID),
        Some(&EventValue::Text("checkout-nps".into()))
    );
    assert_eq!(
        response.properties.get(PROP_ANSWER),
        Some(&EventValue::Text("Great".into()))
    );
    assert_eq!(
        response.properties.get(PROP_ANSWER_KIND),
        Some(&EventValue::Text("option".into()))
    );

    recorder.flush().await;
    let names: Vec<String> = recorder
        .all_events()
        .await
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert!(names.contains(&EVENT_SURVEY_PRESENTED.to_string()));
    assert!(names.contains(&EVENT_SURVEY_RESPONSE.to_string()));

    // Completed and cooling down: the next match is gated
    let mut props = EventProperties::new();
    props.insert("amount".into(), EventValue::Integer(90));
    recorder.record("checkout_completed", props);
    recorder.flush().await;
    assert!(timeout(Duration::from_millis(300), prompts.recv()).await.is_err());

    engine.shutdown().await;
}

/// A cooldown keeps a survey from repeating even without an answer
#[tokio::test]
async fn cooldown_gates_repeat_presentations() {
    const RULES: &str = r#"{"surveys": [{
        "id": "nps", "title": "t", "message": "m",
        "response": {"type": "text"},
        "trigger": {"event": {"name": "tap"}},
        "oncePerSession": false,
        "cooldownSeconds": 3600
    }]}"#;
    let dir = TempDir::new().unwrap();
    let recorder = common::create_recorder(dir.path());
    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);
    recorder.start_session(Some("alice".into()), None).await;

    recorder.record("tap", EventProperties::new());
    let prompt = timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("Timeout waiting for prompt")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "nps");

    recorder.record("tap", EventProperties::new());
    recorder.flush().await;
    assert!(timeout(Duration::from_millis(300), prompts.recv()).await.is_err());

    engine.shutdown().await;
}

/// A delayed survey scheduled before shutdown is presented on the next
/// launch once its time has passed
#[tokio::test]
async fn delayed_survey_survives_restart() {
    const RULES: &str = r#"{"surveys": [{
        "id": "slow-burn", "title": "Still thinking about it?", "message": "Tell us more",
        "response": {"type": "text"},
        "trigger": {"event": {"name": "slow_path", "scheduleAfterSeconds": 3}}
    }]}"#;
    let dir = TempDir::new().unwrap();

    // First run: the trigger matches but the app exits before the delay is up
    {
        let recorder = common::create_recorder(dir.path());
        let (engine, _prompts) = common::spawn_engine(&recorder, RULES);
        recorder.start_session(Some("alice".into()), None).await;
        recorder.record("slow_path", EventProperties::new());

        let store = ScheduledSurveyStore::new(StorageLayout::new(dir.path()));
        assert_eq!(wait_for_pending(&store, Some("alice")).await.len(), 1);

        engine.shutdown().await;
        recorder.shutdown().await;
    }

    // Time passes while the app is closed
    tokio::time::sleep(Duration::from_millis(3300)).await;

    // Second run: the due survey greets the user on resume
    let recorder = common::create_recorder(dir.path());
    recorder.start_session(Some("alice".into()), None).await;
    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);

    let prompt = timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("Timeout waiting for restored survey")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "slow-burn");

    // The entry was consumed by the presentation
    let store = ScheduledSurveyStore::new(StorageLayout::new(dir.path()));
    assert!(store.all_pending(Some("alice"), Utc::now()).await.is_empty());
    assert!(
        store
            .all_triggered(Some("alice"), Utc::now() + chrono::Duration::days(1))
            .await
            .is_empty()
    );

    engine.shutdown().await;
}

/// A not-yet-due entry gets its timer re-armed for the remaining time
#[tokio::test]
async fn pending_delay_rearms_after_restart() {
    const RULES: &str = r#"{"surveys": [{
        "id": "slow-burn", "title": "t", "message": "m",
        "response": {"type": "text"},
        "trigger": {"event": {"name": "slow_path", "scheduleAfterSeconds": 3}}
    }]}"#;
    let dir = TempDir::new().unwrap();

    {
        let recorder = common::create_recorder(dir.path());
        let (engine, _prompts) = common::spawn_engine(&recorder, RULES);
        recorder.start_session(Some("alice".into()), None).await;
        recorder.record("slow_path", EventProperties::new());

        let store = ScheduledSurveyStore::new(StorageLayout::new(dir.path()));
        assert_eq!(wait_for_pending(&store, Some("alice")).await.len(), 1);

        engine.shutdown().await;
        recorder.shutdown().await;
    }

    // Reopen right away: the delay has not elapsed yet
    let recorder = common::create_recorder(dir.path());
    recorder.start_session(Some("alice".into()), None).await;
    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);

    // Nothing is presented on resume itself
    assert!(timeout(Duration::from_millis(300), prompts.recv()).await.is_err());

    // The re-armed timer fires once the original deadline passes
    let prompt = timeout(Duration::from_secs(10), prompts.recv())
        .await
        .expect("Timeout waiting for re-armed survey")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "slow-burn");

    engine.shutdown().await;
}

/// Resume hands back one survey at a time; the rest wait for the next
/// resume signal
#[tokio::test]
async fn restore_presents_at_most_one_per_resume() {
    const RULES: &str = r#"{"surveys": [
        {"id": "first-rule", "title": "t", "message": "m",
         "response": {"type": "text"},
         "trigger": {"event": {"name": "never_a"}}},
        {"id": "second-rule", "title": "t", "message": "m",
         "response": {"type": "text"},
         "trigger": {"event": {"name": "never_b"}}}
    ]}"#;
    let dir = TempDir::new().unwrap();
    let recorder = common::create_recorder(dir.path());
    let session = recorder.start_session(Some("alice".into()), None).await;

    // Two overdue entries left behind by an earlier run
    let store = ScheduledSurveyStore::new(StorageLayout::new(dir.path()));
    let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
    store
        .schedule_for_later(
            "first-rule",
            Some("alice"),
            &session.id,
            chrono::Duration::seconds(60),
            an_hour_ago,
        )
        .await;
    store
        .schedule_for_later(
            "second-rule",
            Some("alice"),
            &session.id,
            chrono::Duration::seconds(60),
            an_hour_ago,
        )
        .await;

    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);

    let prompt = timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("Timeout waiting for restored survey")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "first-rule");
    assert!(timeout(Duration::from_millis(300), prompts.recv()).await.is_err());
    assert_eq!(store.all_triggered(Some("alice"), Utc::now()).await.len(), 1);

    // Foreground counts as another resume
    engine.notify_foreground();
    let prompt = timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("Timeout waiting for second survey")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "second-rule");

    engine.shutdown().await;
}

/// Entries past the retention window are purged instead of presented
#[tokio::test]
async fn aged_entries_are_purged_at_restore() {
    const RULES: &str = r#"{"surveys": [{
        "id": "first-rule", "title": "t", "message": "m",
        "response": {"type": "text"},
        "trigger": {"event": {"name": "never"}}
    }]}"#;
    let dir = TempDir::new().unwrap();
    let recorder = common::create_recorder(dir.path());
    recorder.start_session(Some("alice".into()), None).await;

    let store = ScheduledSurveyStore::new(StorageLayout::new(dir.path()));
    store
        .schedule_for_later(
            "first-rule",
            Some("alice"),
            "stale-session",
            chrono::Duration::seconds(60),
            Utc::now() - chrono::Duration::days(45),
        )
        .await;

    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);

    assert!(timeout(Duration::from_millis(500), prompts.recv()).await.is_err());
    assert!(store.all_pending(Some("alice"), Utc::now()).await.is_empty());
    assert!(
        store
            .all_triggered(Some("alice"), Utc::now() + chrono::Duration::days(1))
            .await
            .is_empty()
    );

    engine.shutdown().await;
}

/// A stored entry whose rule left the configuration is dropped, and the
/// next valid entry is presented instead
#[tokio::test]
async fn entry_for_removed_rule_is_dropped_at_restore() {
    const RULES: &str = r#"{"surveys": [{
        "id": "kept-rule", "title": "t", "message": "m",
        "response": {"type": "text"},
        "trigger": {"event": {"name": "never"}}
    }]}"#;
    let dir = TempDir::new().unwrap();
    let recorder = common::create_recorder(dir.path());
    let session = recorder.start_session(Some("alice".into()), None).await;

    let store = ScheduledSurveyStore::new(StorageLayout::new(dir.path()));
    let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
    store
        .schedule_for_later(
            "ghost-rule",
            Some("alice"),
            &session.id,
            chrono::Duration::seconds(60),
            an_hour_ago,
        )
        .await;
    store
        .schedule_for_later(
            "kept-rule",
            Some("alice"),
            &session.id,
            chrono::Duration::seconds(60),
            an_hour_ago,
        )
        .await;

    let (engine, mut prompts) = common::spawn_engine(&recorder, RULES);

    let prompt = timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("Timeout waiting for restored survey")
        .expect("Presenter dropped");
    assert_eq!(prompt.rule.id, "kept-rule");
    assert!(store.all_triggered(Some("alice"), Utc::now()).await.is_empty());

    engine.shutdown().await;
}
