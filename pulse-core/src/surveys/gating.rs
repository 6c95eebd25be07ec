//! Frequency gating for survey presentations
//!
//! Persists one record per (user, rule) under the user's surveys directory
//! and answers the single question "may this rule be shown now?". Gating
//! fails open: if the state cannot be read the answer is yes, because a
//! survey shown twice is a smaller defect than survey state wedging the
//! pipeline shut.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::config::DebugOptions;
use crate::error::StoreError;
use crate::storage::StorageLayout;

use super::rules::SurveyRule;

/// Presentation history for one (user, rule) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingRecord {
    /// When the rule was last presented
    pub last_shown_at: DateTime<Utc>,
    /// Whether the rule has ever been presented
    pub shown_once: bool,
    /// How many times the rule has been presented; never decreases
    pub attempt_count: u32,
    /// Whether the user completed the survey; terminal
    #[serde(default)]
    pub completed_once: bool,
}

/// Gating knobs extracted from a rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatingParams {
    pub once_per_user: bool,
    pub cooldown_seconds: Option<u64>,
    pub max_attempts: Option<u32>,
    pub attempt_cooldown_seconds: Option<u64>,
}

impl GatingParams {
    /// Extract the gating knobs from a rule.
    ///
    /// A debug cooldown override replaces whichever cooldowns the rule
    /// configures; it never introduces a cooldown the rule does not have.
    pub fn from_rule(rule: &SurveyRule, debug: &DebugOptions) -> Self {
        let mut params = Self {
            once_per_user: rule.once_per_user,
            cooldown_seconds: rule.cooldown_seconds,
            max_attempts: rule.max_attempts,
            attempt_cooldown_seconds: rule.attempt_cooldown_seconds,
        };
        if let Some(override_secs) = debug.cooldown_override_seconds {
            if params.cooldown_seconds.is_some() {
                params.cooldown_seconds = Some(override_secs);
            }
            if params.attempt_cooldown_seconds.is_some() {
                params.attempt_cooldown_seconds = Some(override_secs);
            }
        }
        params
    }
}

/// Convert a config-supplied second count to a duration, clamping values
/// beyond chrono's range instead of panicking on them
pub(crate) fn saturating_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// File-backed gating state, one JSON map per user
pub struct GatingStore {
    layout: StorageLayout,
}

impl GatingStore {
    /// Create a store over the given layout
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Whether the rule may be presented to this user right now.
    ///
    /// Decision order, first match decides:
    /// 1. no record yet: allow
    /// 2. completed: deny
    /// 3. attempt budget exhausted: deny
    /// 4. once per user and already shown: deny
    /// 5. effective cooldown (attempt cooldown wins over cooldown when both
    ///    are configured) still running: deny
    /// 6. allow
    pub async fn can_show(
        &self,
        rule_id: &str,
        user_id: Option<&str>,
        params: &GatingParams,
        now: DateTime<Utc>,
    ) -> bool {
        let records = self.read_records(user_id).await;
        let Some(record) = records.get(rule_id) else {
            return true;
        };

        if record.completed_once {
            return false;
        }
        if params
            .max_attempts
            .is_some_and(|max| record.attempt_count >= max)
        {
            return false;
        }
        if params.once_per_user && record.shown_once {
            return false;
        }

        let effective_cooldown = params.attempt_cooldown_seconds.or(params.cooldown_seconds);
        if let Some(secs) = effective_cooldown {
            // A window too large to place on the calendar never elapses
            let cooling = match record.last_shown_at.checked_add_signed(saturating_seconds(secs)) {
                Some(until) => now < until,
                None => true,
            };
            if cooling {
                return false;
            }
        }

        true
    }

    /// Record a presentation: stamps the time and bumps the attempt count
    pub async fn mark_shown(&self, rule_id: &str, user_id: Option<&str>, now: DateTime<Utc>) {
        let mut records = self.read_records(user_id).await;
        let record = records
            .entry(rule_id.to_string())
            .or_insert_with(|| GatingRecord {
                last_shown_at: now,
                shown_once: false,
                attempt_count: 0,
                completed_once: false,
            });
        record.last_shown_at = now;
        record.shown_once = true;
        record.attempt_count += 1;

        self.write_records(user_id, &records).await;
    }

    /// Record a completed survey; the rule never shows again for this user.
    ///
    /// Without a prior record (possible when the shown write was lost) a
    /// completed record is created whole.
    pub async fn mark_completed(&self, rule_id: &str, user_id: Option<&str>, now: DateTime<Utc>) {
        let mut records = self.read_records(user_id).await;
        match records.get_mut(rule_id) {
            Some(record) => record.completed_once = true,
            None => {
                records.insert(
                    rule_id.to_string(),
                    GatingRecord {
                        last_shown_at: now,
                        shown_once: true,
                        attempt_count: 1,
                        completed_once: true,
                    },
                );
            }
        }

        self.write_records(user_id, &records).await;
    }

    /// Read the record map, skipping malformed entries.
    ///
    /// An unreadable file degrades to an empty map, which makes `can_show`
    /// permissive.
    async fn read_records(&self, user_id: Option<&str>) -> BTreeMap<String, GatingRecord> {
        let path = self.layout.gating_file(user_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            // Not created yet
            Err(_) => return BTreeMap::new(),
        };

        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Gating file unreadable, treating as empty");
                return BTreeMap::new();
            }
        };

        let mut records = BTreeMap::new();
        let Some(map) = value.as_object() else {
            warn!(path = %path.display(), "Gating file is not a map, treating as empty");
            return records;
        };
        for (rule_id, raw) in map {
            match serde_json::from_value::<GatingRecord>(raw.clone()) {
                Ok(record) => {
                    records.insert(rule_id.clone(), record);
                }
                Err(e) => {
                    warn!(rule_id = %rule_id, error = %e, "Skipping malformed gating record");
                }
            }
        }
        records
    }

    async fn write_records(
        &self,
        user_id: Option<&str>,
        records: &BTreeMap<String, GatingRecord>,
    ) {
        if let Err(e) = self.try_write(user_id, records).await {
            warn!(error = %e, "Failed to persist gating records");
        }
    }

    async fn try_write(
        &self,
        user_id: Option<&str>,
        records: &BTreeMap<String, GatingRecord>,
    ) -> Result<(), StoreError> {
        let path = self.layout.gating_file(user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(records)?;
        fs::write(&path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, GatingStore) {
        let dir = TempDir::new().unwrap();
        let store = GatingStore::new(StorageLayout::new(dir.path()));
        (dir, store)
    }

    fn params() -> GatingParams {
        GatingParams::default()
    }

    // ==================== Decision Order Tests ====================

    #[tokio::test]
    async fn no_record_allows() {
        let (_dir, store) = create_test_store();
        assert!(store.can_show("r1", Some("alice"), &params(), Utc::now()).await);
    }

    #[tokio::test]
    async fn completion_is_terminal() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();

        store.mark_shown("r1", Some("alice"), now).await;
        store.mark_completed("r1", Some("alice"), now).await;

        // Even with no other constraints configured, and far in the future
        assert!(
            !store
                .can_show("r1", Some("alice"), &params(), now + Duration::days(365))
                .await
        );
    }

    #[tokio::test]
    async fn max_attempts_exhausts_the_budget() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();
        let params = GatingParams {
            max_attempts: Some(2),
            ..Default::default()
        };

        store.mark_shown("r1", Some("alice"), now).await;
        assert!(store.can_show("r1", Some("alice"), &params, now).await);

        store.mark_shown("r1", Some("alice"), now).await;
        assert!(!store.can_show("r1", Some("alice"), &params, now).await);
    }

    #[tokio::test]
    async fn once_per_user_denies_after_first_show() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();
        let params = GatingParams {
            once_per_user: true,
            ..Default::default()
        };

        assert!(store.can_show("r1", Some("alice"), &params, now).await);
        store.mark_shown("r1", Some("alice"), now).await;
        assert!(
            !store
                .can_show("r1", Some("alice"), &params, now + Duration::days(365))
                .await
        );
    }

    #[tokio::test]
    async fn cooldown_denies_until_elapsed() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();
        let params = GatingParams {
            cooldown_seconds: Some(60),
            ..Default::default()
        };

        store.mark_shown("r1", Some("alice"), now).await;

        assert!(
            !store
                .can_show("r1", Some("alice"), &params, now + Duration::seconds(30))
                .await
        );
        assert!(
            store
                .can_show("r1", Some("alice"), &params, now + Duration::seconds(61))
                .await
        );
    }

    #[tokio::test]
    async fn attempt_cooldown_takes_precedence() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();
        let params = GatingParams {
            cooldown_seconds: Some(3600),
            attempt_cooldown_seconds: Some(60),
            ..Default::default()
        };

        store.mark_shown("r1", Some("alice"), now).await;

        // The hour-long cooldown is ignored; the attempt cooldown governs
        assert!(
            !store
                .can_show("r1", Some("alice"), &params, now + Duration::seconds(30))
                .await
        );
        assert!(
            store
                .can_show("r1", Some("alice"), &params, now + Duration::seconds(120))
                .await
        );
    }

    #[tokio::test]
    async fn absurd_cooldown_denies_without_panicking() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();
        let params = GatingParams {
            cooldown_seconds: Some(u64::MAX),
            ..Default::default()
        };

        store.mark_shown("r1", Some("alice"), now).await;

        assert!(
            !store
                .can_show("r1", Some("alice"), &params, now + Duration::days(365_000))
                .await
        );
    }

    // ==================== Record Bookkeeping Tests ====================

    #[tokio::test]
    async fn mark_shown_accumulates_attempts() {
        let (_dir, store) = create_test_store();
        let first = Utc::now();
        let second = first + Duration::hours(1);

        store.mark_shown("r1", Some("alice"), first).await;
        store.mark_shown("r1", Some("alice"), second).await;

        let records = store.read_records(Some("alice")).await;
        let record = records.get("r1").unwrap();
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.last_shown_at, second);
        assert!(record.shown_once);
        assert!(!record.completed_once);
    }

    #[tokio::test]
    async fn mark_completed_without_record_creates_one() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();

        store.mark_completed("r1", Some("alice"), now).await;

        let records = store.read_records(Some("alice")).await;
        let record = records.get("r1").unwrap();
        assert!(record.completed_once);
        assert!(record.shown_once);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn mark_completed_preserves_attempt_history() {
        let (_dir, store) = create_test_store();
        let shown_at = Utc::now();

        store.mark_shown("r1", Some("alice"), shown_at).await;
        store
            .mark_completed("r1", Some("alice"), shown_at + Duration::minutes(1))
            .await;

        let records = store.read_records(Some("alice")).await;
        let record = records.get("r1").unwrap();
        assert_eq!(record.attempt_count, 1);
        assert_eq!(record.last_shown_at, shown_at);
        assert!(record.completed_once);
    }

    #[tokio::test]
    async fn users_are_gated_independently() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();
        let params = GatingParams {
            once_per_user: true,
            ..Default::default()
        };

        store.mark_shown("r1", Some("alice"), now).await;

        assert!(!store.can_show("r1", Some("alice"), &params, now).await);
        assert!(store.can_show("r1", Some("bob"), &params, now).await);
        assert!(store.can_show("r1", None, &params, now).await);
    }

    // ==================== Degradation Tests ====================

    #[tokio::test]
    async fn unreadable_file_fails_open() {
        let (_dir, store) = create_test_store();

        let path = store.layout.gating_file(Some("alice"));
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "{broken json").await.unwrap();

        let params = GatingParams {
            once_per_user: true,
            ..Default::default()
        };
        assert!(store.can_show("r1", Some("alice"), &params, Utc::now()).await);
    }

    #[tokio::test]
    async fn malformed_entry_does_not_hide_others() {
        let (_dir, store) = create_test_store();
        let now = Utc::now();

        store.mark_shown("good", Some("alice"), now).await;

        // Splice a junk entry into the map on disk
        let path = store.layout.gating_file(Some("alice"));
        let content = fs::read_to_string(&path).await.unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&content).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("bad".into(), serde_json::json!({"attempt_count": "NaN"}));
        fs::write(&path, serde_json::to_string(&value).unwrap())
            .await
            .unwrap();

        let records = store.read_records(Some("alice")).await;
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("good"));
    }

    // ==================== Params Tests ====================

    #[test]
    fn params_extracted_from_rule() {
        let config = crate::surveys::rules::SurveyConfig::from_json(
            r#"{"surveys": [{
                "id": "r1", "title": "t", "message": "m",
                "response": {"type": "text"},
                "trigger": {"event": {"name": "tap"}},
                "oncePerUser": true,
                "cooldownSeconds": 3600,
                "maxAttempts": 3,
                "attemptCooldownSeconds": 60
            }]}"#,
        )
        .unwrap();
        let rule = config.rule("r1").unwrap();

        let params = GatingParams::from_rule(rule, &DebugOptions::default());
        assert_eq!(
            params,
            GatingParams {
                once_per_user: true,
                cooldown_seconds: Some(3600),
                max_attempts: Some(3),
                attempt_cooldown_seconds: Some(60),
            }
        );
    }

    #[test]
    fn cooldown_override_only_replaces_configured_cooldowns() {
        let config = crate::surveys::rules::SurveyConfig::from_json(
            r#"{"surveys": [
                {"id": "with", "title": "t", "message": "m",
                 "response": {"type": "text"},
                 "trigger": {"event": {"name": "tap"}},
                 "cooldownSeconds": 3600},
                {"id": "without", "title": "t", "message": "m",
                 "response": {"type": "text"},
                 "trigger": {"event": {"name": "tap"}}}
            ]}"#,
        )
        .unwrap();
        let debug = DebugOptions {
            cooldown_override_seconds: Some(5),
            ..Default::default()
        };

        let with = GatingParams::from_rule(config.rule("with").unwrap(), &debug);
        assert_eq!(with.cooldown_seconds, Some(5));

        let without = GatingParams::from_rule(config.rule("without").unwrap(), &debug);
        assert_eq!(without.cooldown_seconds, None);
    }
}
