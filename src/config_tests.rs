use super::*;

#[test]
fn default_config_validates_and_covers_every_reason() {
    let config = default_config();
    validate_config(&config).expect("default config is valid");
    assert!(!config.sending_enabled);
    assert_eq!(config.initial_weights.len(), ReasonCode::ALL.len());
    assert_eq!(config.learning.success_step, 2);
    assert_eq!(config.learning.failure_step, 3);
    assert_eq!(config.priority, PriorityThresholds { urgent: 90, high: 60, medium: 30 });
}

#[test]
fn thresholds_must_descend() {
    let mut config = default_config();
    config.priority.high = config.priority.urgent;
    let err = validate_config(&config).expect_err("flat thresholds");
    assert!(err.to_string().contains("urgent > high > medium"));
}

#[test]
fn initial_weights_must_sit_inside_bounds() {
    let mut config = default_config();
    config.initial_weights.insert(ReasonCode::HotLead, 5);
    let err = validate_config(&config).expect_err("weight below min");
    assert!(err.to_string().contains("hot_lead"));
}

#[test]
fn sparse_config_fills_defaults() {
    let config: EngineConfig =
        serde_json::from_str(r#"{"schema_version": 1, "sending_enabled": true}"#)
            .expect("parse sparse config");
    validate_config(&config).expect("sparse config is valid");
    assert!(config.sending_enabled);
    assert_eq!(config.throughput, ThroughputConfig::default());
    assert_eq!(config.default_tick_limit, 50);
}

#[test]
fn load_config_reports_missing_file_with_init_hint() {
    let dir = tempfile::tempdir().expect("temp dir");
    let paths = WorkspacePaths::new(dir.path().to_path_buf());
    let err = load_config(&paths).expect_err("missing config");
    assert!(err.to_string().contains("outreach init"));

    write_config(&paths, &default_config()).expect("write config");
    assert_eq!(load_config(&paths).expect("load config"), default_config());
}
