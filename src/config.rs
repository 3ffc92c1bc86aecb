use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Thresholds that trigger notification alerts.
///
/// Defaults: heart rate 50–100 bpm, SpO2 below 92 %, temperature
/// 35.5–38.0 °C, respiration 10–25 breaths/min.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AlertThresholds {
    #[serde(default = "default_alert_heart_rate_high")]
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_high: f64,

    #[serde(default = "default_alert_heart_rate_low")]
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_low: f64,

    #[serde(default = "default_alert_blood_oxygen_low")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub blood_oxygen_low: f64,

    #[serde(default = "default_alert_temperature_high")]
    #[validate(range(min = 25.0, max = 45.0))]
    pub temperature_high: f64,

    #[serde(default = "default_alert_temperature_low")]
    #[validate(range(min = 25.0, max = 45.0))]
    pub temperature_low: f64,

    #[serde(default = "default_alert_respiration_high")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub respiration_high: f64,

    #[serde(default = "default_alert_respiration_low")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub respiration_low: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            heart_rate_high: default_alert_heart_rate_high(),
            heart_rate_low: default_alert_heart_rate_low(),
            blood_oxygen_low: default_alert_blood_oxygen_low(),
            temperature_high: default_alert_temperature_high(),
            temperature_low: default_alert_temperature_low(),
            respiration_high: default_alert_respiration_high(),
            respiration_low: default_alert_respiration_low(),
        }
    }
}

impl AlertThresholds {
    /// Builds thresholds from legacy `HEART_RATE_HIGH`-style key/value
    /// pairs. Missing keys keep their defaults; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, AppConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut thresholds = Self::default();
        thresholds.apply_pairs(pairs)?;
        Ok(thresholds)
    }

    /// Overrides thresholds from legacy key/value pairs and re-validates.
    /// Returns how many keys were applied.
    pub fn apply_pairs<I, K, V>(&mut self, pairs: I) -> Result<usize, AppConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut applied = 0;
        for (key, value) in pairs {
            let key = key.as_ref();
            let slot = match key.to_ascii_uppercase().as_str() {
                "HEART_RATE_HIGH" => &mut self.heart_rate_high,
                "HEART_RATE_LOW" => &mut self.heart_rate_low,
                "BLOOD_OXYGEN_LOW" => &mut self.blood_oxygen_low,
                "TEMPERATURE_HIGH" => &mut self.temperature_high,
                "TEMPERATURE_LOW" => &mut self.temperature_low,
                "RESPIRATION_HIGH" => &mut self.respiration_high,
                "RESPIRATION_LOW" => &mut self.respiration_low,
                _ => continue,
            };
            *slot = parse_threshold(key, value.as_ref())?;
            applied += 1;
        }

        self.validate()?;
        self.validate_ordering()?;
        Ok(applied)
    }

    fn validate_ordering(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_ordered(
            &mut errors,
            "heart_rate_low",
            self.heart_rate_low,
            self.heart_rate_high,
        );
        check_ordered(
            &mut errors,
            "temperature_low",
            self.temperature_low,
            self.temperature_high,
        );
        check_ordered(
            &mut errors,
            "respiration_low",
            self.respiration_low,
            self.respiration_high,
        );
        into_result(errors)
    }
}

/// Stricter thresholds behind the advisory risk estimate. Kept separate
/// from [`AlertThresholds`]: one set pages people, the other only informs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RiskThresholds {
    #[serde(default = "default_risk_heart_rate_high")]
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_high: f64,

    /// Above this the tachycardia risk is HIGH instead of MEDIUM
    #[serde(default = "default_risk_heart_rate_severe")]
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_severe: f64,

    #[serde(default = "default_risk_heart_rate_low")]
    #[validate(range(min = 1.0, max = 300.0))]
    pub heart_rate_low: f64,

    #[serde(default = "default_risk_blood_oxygen_low")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub blood_oxygen_low: f64,

    /// Below this the hypoxia risk is CRITICAL instead of HIGH
    #[serde(default = "default_risk_blood_oxygen_critical")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub blood_oxygen_critical: f64,

    #[serde(default = "default_risk_temperature_high")]
    #[validate(range(min = 25.0, max = 45.0))]
    pub temperature_high: f64,

    /// Above this the fever risk is HIGH instead of MEDIUM
    #[serde(default = "default_risk_temperature_severe")]
    #[validate(range(min = 25.0, max = 45.0))]
    pub temperature_severe: f64,

    #[serde(default = "default_risk_temperature_low")]
    #[validate(range(min = 25.0, max = 45.0))]
    pub temperature_low: f64,

    #[serde(default = "default_risk_respiration_high")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub respiration_high: f64,

    #[serde(default = "default_risk_respiration_low")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub respiration_low: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            heart_rate_high: default_risk_heart_rate_high(),
            heart_rate_severe: default_risk_heart_rate_severe(),
            heart_rate_low: default_risk_heart_rate_low(),
            blood_oxygen_low: default_risk_blood_oxygen_low(),
            blood_oxygen_critical: default_risk_blood_oxygen_critical(),
            temperature_high: default_risk_temperature_high(),
            temperature_severe: default_risk_temperature_severe(),
            temperature_low: default_risk_temperature_low(),
            respiration_high: default_risk_respiration_high(),
            respiration_low: default_risk_respiration_low(),
        }
    }
}

impl RiskThresholds {
    fn validate_ordering(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_ordered(
            &mut errors,
            "heart_rate_low",
            self.heart_rate_low,
            self.heart_rate_high,
        );
        check_ordered(
            &mut errors,
            "heart_rate_high",
            self.heart_rate_high,
            self.heart_rate_severe,
        );
        check_ordered(
            &mut errors,
            "blood_oxygen_critical",
            self.blood_oxygen_critical,
            self.blood_oxygen_low,
        );
        check_ordered(
            &mut errors,
            "temperature_low",
            self.temperature_low,
            self.temperature_high,
        );
        check_ordered(
            &mut errors,
            "temperature_high",
            self.temperature_high,
            self.temperature_severe,
        );
        check_ordered(
            &mut errors,
            "respiration_low",
            self.respiration_low,
            self.respiration_high,
        );
        into_result(errors)
    }
}

/// Isolation-forest detection settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    /// Expected outlier fraction, strictly between 0 and 1
    #[serde(default = "default_contamination")]
    #[validate(custom = "validate_open_fraction")]
    pub contamination: f64,

    #[serde(default = "default_random_state")]
    pub random_state: u64,

    #[serde(default = "default_n_estimators")]
    #[validate(range(min = 1, max = 10000))]
    pub n_estimators: usize,

    /// Upper bound on rows drawn per tree
    #[serde(default = "default_max_samples")]
    #[validate(range(min = 2))]
    pub max_samples: usize,

    /// Fraction held out for evaluation when enough rows are available
    #[serde(default = "default_holdout_fraction")]
    #[validate(custom = "validate_open_fraction")]
    pub holdout_fraction: f64,

    /// A hold-out split is only made above this many rows
    #[serde(default = "default_min_samples_for_holdout")]
    pub min_samples_for_holdout: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            contamination: default_contamination(),
            random_state: default_random_state(),
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            holdout_fraction: default_holdout_fraction(),
            min_samples_for_holdout: default_min_samples_for_holdout(),
        }
    }
}

/// Recurrent forecaster settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForecastingConfig {
    /// Switch the backend off even when it is compiled in
    #[serde(default = "default_true_bool")]
    pub enabled: bool,

    #[serde(default = "default_window_size")]
    #[validate(range(min = 1, max = 1000))]
    pub window_size: usize,

    #[serde(default = "default_epochs")]
    #[validate(range(min = 1, max = 10000))]
    pub epochs: usize,

    #[serde(default = "default_horizon")]
    #[validate(range(min = 1, max = 10000))]
    pub horizon: usize,

    #[serde(default = "default_hidden_units")]
    #[validate(range(min = 1, max = 1024))]
    pub hidden_units: usize,

    #[serde(default = "default_dense_units")]
    #[validate(range(min = 1, max = 1024))]
    pub dense_units: usize,

    #[serde(default = "default_learning_rate")]
    #[validate(custom = "validate_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 100000))]
    pub batch_size: usize,

    #[serde(default = "default_random_state")]
    pub seed: u64,
}

impl Default for ForecastingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true_bool(),
            window_size: default_window_size(),
            epochs: default_epochs(),
            horizon: default_horizon(),
            hidden_units: default_hidden_units(),
            dense_units: default_dense_units(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            seed: default_random_state(),
        }
    }
}

/// Synthetic data generation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_num_users")]
    #[validate(range(min = 1, max = 100000))]
    pub num_users: usize,

    #[serde(default = "default_minutes_per_user")]
    #[validate(range(min = 1, max = 10000000))]
    pub minutes_per_user: usize,

    #[serde(default = "default_contamination")]
    #[validate(custom = "validate_closed_fraction")]
    pub anomaly_rate: f64,

    /// Seed for the per-minute draws; unseeded runs use OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_users: default_num_users(),
            minutes_per_user: default_minutes_per_user(),
            anomaly_rate: default_contamination(),
            seed: None,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    #[validate]
    pub alert_thresholds: AlertThresholds,

    #[serde(default)]
    #[validate]
    pub risk_thresholds: RiskThresholds,

    #[serde(default)]
    #[validate]
    pub detection: DetectionConfig,

    #[serde(default)]
    #[validate]
    pub forecasting: ForecastingConfig,

    #[serde(default)]
    #[validate]
    pub simulation: SimulationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            alert_thresholds: AlertThresholds::default(),
            risk_thresholds: RiskThresholds::default(),
            detection: DetectionConfig::default(),
            forecasting: ForecastingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Cross-field checks the derive cannot express.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        self.alert_thresholds.validate_ordering()?;
        self.risk_thresholds.validate_ordering()?;
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid threshold {key}={value:?}: expected a finite number")]
    InvalidThreshold { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_true_bool() -> bool {
    true
}

fn default_alert_heart_rate_high() -> f64 {
    100.0
}
fn default_alert_heart_rate_low() -> f64 {
    50.0
}
fn default_alert_blood_oxygen_low() -> f64 {
    92.0
}
fn default_alert_temperature_high() -> f64 {
    38.0
}
fn default_alert_temperature_low() -> f64 {
    35.5
}
fn default_alert_respiration_high() -> f64 {
    25.0
}
fn default_alert_respiration_low() -> f64 {
    10.0
}

fn default_risk_heart_rate_high() -> f64 {
    100.0
}
fn default_risk_heart_rate_severe() -> f64 {
    120.0
}
fn default_risk_heart_rate_low() -> f64 {
    60.0
}
fn default_risk_blood_oxygen_low() -> f64 {
    95.0
}
fn default_risk_blood_oxygen_critical() -> f64 {
    90.0
}
fn default_risk_temperature_high() -> f64 {
    37.5
}
fn default_risk_temperature_severe() -> f64 {
    38.5
}
fn default_risk_temperature_low() -> f64 {
    36.0
}
fn default_risk_respiration_high() -> f64 {
    20.0
}
fn default_risk_respiration_low() -> f64 {
    12.0
}

fn default_contamination() -> f64 {
    0.05
}
fn default_random_state() -> u64 {
    42
}
fn default_n_estimators() -> usize {
    100
}
fn default_max_samples() -> usize {
    256
}
fn default_holdout_fraction() -> f64 {
    0.2
}
fn default_min_samples_for_holdout() -> usize {
    50
}

fn default_window_size() -> usize {
    10
}
fn default_epochs() -> usize {
    20
}
fn default_horizon() -> usize {
    10
}
fn default_hidden_units() -> usize {
    32
}
fn default_dense_units() -> usize {
    16
}
fn default_learning_rate() -> f64 {
    0.001
}
fn default_batch_size() -> usize {
    32
}

fn default_num_users() -> usize {
    3
}
fn default_minutes_per_user() -> usize {
    300
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_open_fraction(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        let mut err = ValidationError::new("open_fraction");
        err.message = Some("must be a finite value strictly between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_closed_fraction(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 || value > 1.0 {
        let mut err = ValidationError::new("closed_fraction");
        err.message = Some("must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_learning_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("learning_rate");
        err.message = Some("learning_rate must be in (0.0, 1.0]".into());
        return Err(err);
    }
    Ok(())
}

fn check_ordered(errors: &mut ValidationErrors, field: &'static str, low: f64, high: f64) {
    if low >= high {
        let mut err = ValidationError::new("threshold_order");
        err.message = Some(format!("{field} ({low}) must be below its upper counterpart ({high})").into());
        errors.add(field, err);
    }
}

fn into_result(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_threshold(key: &str, raw: &str) -> Result<f64, AppConfigError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppConfigError::InvalidThreshold {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let filter = env_filter(level);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Stderr subscriber at the default level, for events raised while the
/// configuration itself is loading. Scope it with
/// `tracing::subscriber::with_default`.
pub fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_LOG_LEVEL))
        .with_writer(std::io::stderr)
        .finish()
}

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
    let default_directive = format!("vitalsense={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    tracing_subscriber::EnvFilter::new(filter_directive)
}

/// Keeps the variables whose name and value are both valid Unicode.
fn unicode_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
/// 5. Legacy flat threshold variables (HEART_RATE_HIGH, ...)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    let mut app_config = load_config_from(Path::new(CONFIG_DIR), &run_env)?;

    let applied = app_config.alert_thresholds.apply_pairs(unicode_vars(env::vars_os()))?;
    if applied > 0 {
        info!(applied, "Applied legacy alert threshold overrides from environment");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Loads configuration from an explicit directory and profile.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let profile_file = config_dir.join(run_env);

    let config = Config::builder()
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&profile_file.to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration threshold validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}
