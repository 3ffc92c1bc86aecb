use assert_matches::assert_matches;
use std::fs;
use tempfile::tempdir;
use vitalsense::config::{load_config_from, AppConfigError};

#[test]
fn missing_directory_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent"), "test").unwrap();
    assert_eq!(config.environment, "test");
    assert_eq!(config.alert_thresholds.heart_rate_high, 100.0);
    assert_eq!(config.detection.contamination, 0.05);
    assert_eq!(config.forecasting.window_size, 10);
}

#[test]
fn profile_file_overrides_default_file() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("default.toml"),
        r#"
log_level = "debug"

[alert_thresholds]
heart_rate_high = 110.0

[detection]
contamination = 0.1
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("staging.toml"),
        r#"
[alert_thresholds]
heart_rate_high = 120.0
"#,
    )
    .unwrap();

    let config = load_config_from(dir.path(), "staging").unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.alert_thresholds.heart_rate_high, 120.0);
    assert_eq!(config.alert_thresholds.heart_rate_low, 50.0);
    assert_eq!(config.detection.contamination, 0.1);
}

#[test]
fn inverted_thresholds_fail_at_load() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("default.toml"),
        r#"
[alert_thresholds]
temperature_low = 39.0
temperature_high = 38.0
"#,
    )
    .unwrap();
    assert_matches!(
        load_config_from(dir.path(), "development"),
        Err(AppConfigError::Validation(_))
    );
}

#[test]
fn out_of_range_contamination_fails_at_load() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("default.toml"),
        "[detection]\ncontamination = 0.0\n",
    )
    .unwrap();
    assert_matches!(
        load_config_from(dir.path(), "development"),
        Err(AppConfigError::Validation(_))
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("default.toml"),
        "[alert_thresholds]\npulse_high = 100.0\n",
    )
    .unwrap();
    assert_matches!(
        load_config_from(dir.path(), "development"),
        Err(AppConfigError::Load(_))
    );
}
