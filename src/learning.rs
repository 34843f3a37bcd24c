//! Reason-code weights and the call-outcome feedback loop.
//!
//! Weights are process-wide state behind one lock: every feedback event is a
//! single read-modify-write, and the feedback log is appended under the same
//! guard so the log order matches the order weights moved.
use crate::config::LearningConfig;
use crate::scoring::ReasonCode;
use crate::workspace::{read_json_optional, read_jsonl, write_json_atomic, WorkspacePaths};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

pub const WEIGHTS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Successful,
    NoAnswer,
    NotInterested,
    WrongContact,
    WrongTiming,
}

impl CallOutcome {
    pub const ALL: [CallOutcome; 5] = [
        CallOutcome::Successful,
        CallOutcome::NoAnswer,
        CallOutcome::NotInterested,
        CallOutcome::WrongContact,
        CallOutcome::WrongTiming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Successful => "successful",
            CallOutcome::NoAnswer => "no_answer",
            CallOutcome::NotInterested => "not_interested",
            CallOutcome::WrongContact => "wrong_contact",
            CallOutcome::WrongTiming => "wrong_timing",
        }
    }

    /// Signed effect on the reason's weight.
    fn adjustment(&self, config: &LearningConfig) -> i64 {
        match self {
            CallOutcome::Successful => i64::from(config.success_step),
            CallOutcome::NotInterested | CallOutcome::WrongContact => {
                -i64::from(config.failure_step)
            }
            CallOutcome::NoAnswer | CallOutcome::WrongTiming => 0,
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallOutcome {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        CallOutcome::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == normalized)
            .ok_or_else(|| format!("unknown call outcome {raw:?}"))
    }
}

/// Immutable record of one call outcome and the weight move it caused.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub contact_id: String,
    pub reason_code: ReasonCode,
    pub outcome: CallOutcome,
    pub weight_before: u32,
    pub weight_after: u32,
    pub at: u64,
}

#[derive(Debug, Default)]
struct WeightState {
    weights: BTreeMap<ReasonCode, u32>,
    log: Vec<FeedbackRecord>,
}

#[derive(Debug)]
pub struct WeightStore {
    config: LearningConfig,
    state: Mutex<WeightState>,
}

impl WeightStore {
    /// Start from `initial`, filling missing codes with their defaults.
    pub fn new(config: LearningConfig, initial: &BTreeMap<ReasonCode, u32>) -> Self {
        let weights = ReasonCode::ALL
            .into_iter()
            .map(|code| {
                let raw = initial
                    .get(&code)
                    .copied()
                    .unwrap_or_else(|| code.default_weight());
                (code, raw.clamp(config.min_weight, config.max_weight))
            })
            .collect();
        Self {
            config,
            state: Mutex::new(WeightState {
                weights,
                log: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn weight(&self, code: ReasonCode) -> u32 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .weights
            .get(&code)
            .copied()
            .unwrap_or_else(|| code.default_weight())
    }

    /// Apply one outcome atomically and append it to the in-memory log.
    pub fn apply_feedback(
        &self,
        contact_id: &str,
        reason: ReasonCode,
        outcome: CallOutcome,
        now: u64,
    ) -> FeedbackRecord {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state
            .weights
            .get(&reason)
            .copied()
            .unwrap_or_else(|| reason.default_weight());
        let moved = i64::from(before) + outcome.adjustment(&self.config);
        let after = moved.clamp(
            i64::from(self.config.min_weight),
            i64::from(self.config.max_weight),
        ) as u32;
        state.weights.insert(reason, after);
        let record = FeedbackRecord {
            contact_id: contact_id.to_string(),
            reason_code: reason,
            outcome,
            weight_before: before,
            weight_after: after,
            at: now,
        };
        state.log.push(record.clone());
        record
    }

    /// Full weight table for audits and persistence.
    pub fn snapshot(&self) -> BTreeMap<ReasonCode, u32> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.weights.clone()
    }

    /// Feedback applied through this instance, oldest first.
    pub fn feedback_log(&self) -> Vec<FeedbackRecord> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.log.clone()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WeightsFile {
    pub schema_version: u32,
    pub updated_at: u64,
    pub weights: BTreeMap<ReasonCode, u32>,
}

/// Restore the weight table, falling back to `initial` before any feedback.
pub fn load_weights(
    paths: &WorkspacePaths,
    config: &LearningConfig,
    initial: &BTreeMap<ReasonCode, u32>,
) -> Result<WeightStore> {
    let path = paths.weights_path();
    let Some(file) = read_json_optional::<WeightsFile>(&path)? else {
        return Ok(WeightStore::new(config.clone(), initial));
    };
    if file.schema_version != WEIGHTS_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported weights schema_version {} in {}",
            file.schema_version,
            path.display()
        ));
    }
    Ok(WeightStore::new(config.clone(), &file.weights))
}

pub fn write_weights(paths: &WorkspacePaths, store: &WeightStore, now: u64) -> Result<()> {
    let file = WeightsFile {
        schema_version: WEIGHTS_SCHEMA_VERSION,
        updated_at: now,
        weights: store.snapshot(),
    };
    write_json_atomic(&paths.weights_path(), &file).context("write weights")
}

pub fn load_feedback_log(paths: &WorkspacePaths) -> Result<Vec<FeedbackRecord>> {
    read_jsonl(&paths.feedback_log_path()).context("read feedback log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_initial_weights;
    use std::sync::Arc;

    fn store() -> WeightStore {
        WeightStore::new(LearningConfig::default(), &default_initial_weights())
    }

    #[test]
    fn success_raises_and_caps_at_max() {
        let store = store();
        let record = store.apply_feedback("c1", ReasonCode::HotLead, CallOutcome::Successful, 1);
        assert_eq!((record.weight_before, record.weight_after), (80, 82));
        for _ in 0..50 {
            store.apply_feedback("c1", ReasonCode::HotLead, CallOutcome::Successful, 2);
        }
        assert_eq!(store.weight(ReasonCode::HotLead), 100);
    }

    #[test]
    fn failures_lower_and_floor_at_min() {
        let store = store();
        store.apply_feedback("c1", ReasonCode::Reactivation, CallOutcome::NotInterested, 1);
        assert_eq!(store.weight(ReasonCode::Reactivation), 27);
        for _ in 0..20 {
            store.apply_feedback("c1", ReasonCode::Reactivation, CallOutcome::WrongContact, 2);
        }
        assert_eq!(store.weight(ReasonCode::Reactivation), 10);
    }

    #[test]
    fn neutral_outcomes_are_logged_without_moving_weights() {
        let store = store();
        store.apply_feedback("c1", ReasonCode::NoShow, CallOutcome::NoAnswer, 1);
        store.apply_feedback("c1", ReasonCode::NoShow, CallOutcome::WrongTiming, 2);
        assert_eq!(store.weight(ReasonCode::NoShow), 70);
        assert_eq!(store.feedback_log().len(), 2);
    }

    #[test]
    fn weights_stay_in_bounds_under_mixed_feedback() {
        let store = store();
        for round in 0..200u64 {
            let outcome = CallOutcome::ALL[(round % 5) as usize];
            let code = ReasonCode::ALL[(round % 9) as usize];
            store.apply_feedback("c1", code, outcome, round);
        }
        assert!(store
            .snapshot()
            .values()
            .all(|weight| (10..=100).contains(weight)));
    }

    #[test]
    fn concurrent_feedback_loses_no_updates() {
        let store = Arc::new(WeightStore::new(
            LearningConfig::default(),
            &BTreeMap::from([(ReasonCode::InactiveCustomer, 10)]),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store.apply_feedback(
                            "c1",
                            ReasonCode::InactiveCustomer,
                            CallOutcome::Successful,
                            1,
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(store.weight(ReasonCode::InactiveCustomer), 50);
        assert_eq!(store.feedback_log().len(), 20);
    }

    #[test]
    fn out_of_range_initial_weights_are_clamped() {
        let store = WeightStore::new(
            LearningConfig::default(),
            &BTreeMap::from([(ReasonCode::HotLead, 500)]),
        );
        assert_eq!(store.weight(ReasonCode::HotLead), 100);
        assert_eq!(store.weight(ReasonCode::TicketUrgent), 90);
    }

    #[test]
    fn persisted_weights_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        let initial = default_initial_weights();
        let store = load_weights(&paths, &LearningConfig::default(), &initial).expect("load");
        store.apply_feedback("c1", ReasonCode::EmailReplied, CallOutcome::Successful, 5);
        write_weights(&paths, &store, 5).expect("write");

        let reloaded = load_weights(&paths, &LearningConfig::default(), &initial).expect("reload");
        assert_eq!(reloaded.weight(ReasonCode::EmailReplied), 77);
        assert!(load_feedback_log(&paths).expect("empty log").is_empty());
    }
}
