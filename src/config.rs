//! Engine configuration helpers.
//!
//! This module loads, validates, and writes the workspace-owned config. The
//! learning step sizes and priority thresholds live here rather than in code
//! because they are business tuning, not invariants.
use crate::scoring::ReasonCode;
use crate::workspace::{write_json_atomic, WorkspacePaths};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ThroughputConfig {
    pub max_sends: u32,
    pub window_secs: u64,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            max_sends: 50,
            window_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LearningConfig {
    pub success_step: u32,
    pub failure_step: u32,
    pub min_weight: u32,
    pub max_weight: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            success_step: 2,
            failure_step: 3,
            min_weight: 10,
            max_weight: 100,
        }
    }
}

/// Inclusive lower bounds for each priority bucket. Any positive score below
/// `medium` is `low`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PriorityThresholds {
    pub urgent: u32,
    pub high: u32,
    pub medium: u32,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            urgent: 90,
            high: 60,
            medium: 30,
        }
    }
}

/// Recency windows (in days) for each signal check.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SignalWindows {
    pub hot_lead_days: u64,
    pub email_reply_days: u64,
    pub ticket_urgent_days: u64,
    pub ticket_waiting_days: u64,
    pub no_show_days: u64,
    pub meeting_followup_days: u64,
    pub proposal_followup_days: u64,
    pub inactive_customer_days: u64,
    pub reactivation_days: u64,
}

impl Default for SignalWindows {
    fn default() -> Self {
        Self {
            hot_lead_days: 14,
            email_reply_days: 2,
            ticket_urgent_days: 3,
            ticket_waiting_days: 7,
            no_show_days: 7,
            meeting_followup_days: 3,
            proposal_followup_days: 3,
            inactive_customer_days: 60,
            reactivation_days: 90,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub schema_version: u32,
    /// Global kill switch for real sends.
    #[serde(default)]
    pub sending_enabled: bool,
    #[serde(default)]
    pub throughput: ThroughputConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub priority: PriorityThresholds,
    #[serde(default)]
    pub signals: SignalWindows,
    #[serde(default = "default_initial_weights")]
    pub initial_weights: BTreeMap<ReasonCode, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_enroll_sequence: Option<String>,
    #[serde(default = "default_tick_limit")]
    pub default_tick_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        default_config()
    }
}

fn default_tick_limit() -> usize {
    50
}

pub fn default_initial_weights() -> BTreeMap<ReasonCode, u32> {
    ReasonCode::ALL
        .into_iter()
        .map(|code| (code, code.default_weight()))
        .collect()
}

/// Build the default config used when a workspace is first initialized.
///
/// Sending starts disabled so a fresh workspace can only hold or dry-run.
pub fn default_config() -> EngineConfig {
    EngineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        sending_enabled: false,
        throughput: ThroughputConfig::default(),
        learning: LearningConfig::default(),
        priority: PriorityThresholds::default(),
        signals: SignalWindows::default(),
        initial_weights: default_initial_weights(),
        auto_enroll_sequence: None,
        default_tick_limit: default_tick_limit(),
    }
}

/// Load the workspace-owned config from `config.json`.
pub fn load_config(paths: &WorkspacePaths) -> Result<EngineConfig> {
    let path = paths.config_path();
    if !path.is_file() {
        return Err(anyhow!(
            "missing {} (run `outreach init --workspace {}`)",
            path.display(),
            paths.root().display()
        ));
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: EngineConfig =
        serde_json::from_slice(&bytes).context("parse engine config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Persist a config in a stable JSON format.
pub fn write_config(paths: &WorkspacePaths, config: &EngineConfig) -> Result<()> {
    write_json_atomic(&paths.config_path(), config).context("write engine config")
}

/// Validate schema version, bounds, and threshold ordering.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.throughput.max_sends == 0 {
        return Err(anyhow!("throughput.max_sends must be at least 1"));
    }
    if config.throughput.window_secs == 0 {
        return Err(anyhow!("throughput.window_secs must be at least 1"));
    }
    let learning = &config.learning;
    if learning.min_weight >= learning.max_weight {
        return Err(anyhow!(
            "learning.min_weight ({}) must be below learning.max_weight ({})",
            learning.min_weight,
            learning.max_weight
        ));
    }
    if learning.success_step == 0 || learning.failure_step == 0 {
        return Err(anyhow!("learning step sizes must be positive"));
    }
    let priority = &config.priority;
    if !(priority.urgent > priority.high && priority.high > priority.medium && priority.medium > 0)
    {
        return Err(anyhow!(
            "priority thresholds must satisfy urgent > high > medium > 0 (got {}/{}/{})",
            priority.urgent,
            priority.high,
            priority.medium
        ));
    }
    for (code, weight) in &config.initial_weights {
        if *weight < learning.min_weight || *weight > learning.max_weight {
            return Err(anyhow!(
                "initial weight for {code} ({weight}) is outside [{}, {}]",
                learning.min_weight,
                learning.max_weight
            ));
        }
    }
    if let Some(sequence) = config.auto_enroll_sequence.as_deref() {
        if sequence.trim().is_empty() {
            return Err(anyhow!("auto_enroll_sequence must be non-empty when set"));
        }
    }
    if config.default_tick_limit == 0 {
        return Err(anyhow!("default_tick_limit must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
