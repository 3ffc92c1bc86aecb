use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use vitalsense::{
    config::{self, AppConfig},
    ml::{
        self,
        forecasting::{select_backend, TrainingOutcome, TrainingParams},
    },
    models::{VitalRecord, VitalsSnapshot},
    services::{alerts::AlertEngine, risk, summary::VitalMetric},
    simulation::{SimulatedSeries, VitalGenerator},
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = tracing::subscriber::with_default(config::bootstrap_subscriber(), config::load_config)
        .context("failed to load configuration")?;
    config::init_tracing(config.log_level(), config.log_json);
    debug!(environment = %config.environment, "Configuration loaded");

    match cli.command {
        Commands::Simulate(args) => handle_simulate(&config, args, cli.json),
        Commands::Detect(args) => handle_detect(&config, args, cli.json),
        Commands::Forecast(args) => handle_forecast(&config, args, cli.json),
        Commands::Check(args) => handle_check(&config, args, cli.json),
    }
}

#[derive(Parser)]
#[command(name = "vitalsense", about = "Vital-sign analytics: simulation, anomaly detection, forecasting and alerts", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic multi-user dataset
    Simulate(SimulateArgs),
    /// Label anomalies with an isolation forest
    Detect(DetectArgs),
    /// Train a forecaster on one metric and roll it forward
    Forecast(ForecastArgs),
    /// Evaluate alert and risk rules for one reading
    Check(CheckArgs),
}

#[derive(Args)]
struct DataSource {
    #[arg(long, help = "JSON file with an array of vital records; simulated when absent")]
    input: Option<PathBuf>,
    #[arg(long, help = "Simulated users (defaults to config)")]
    users: Option<usize>,
    #[arg(long, help = "Simulated minutes per user (defaults to config)")]
    minutes: Option<usize>,
    #[arg(long, help = "Injected anomaly rate (defaults to config)")]
    rate: Option<f64>,
    #[arg(long, help = "Seed for reproducible simulation")]
    seed: Option<u64>,
}

#[derive(Args)]
struct SimulateArgs {
    #[command(flatten)]
    source: DataSource,
    #[arg(long, help = "Write the generated records to this JSON file")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DetectArgs {
    #[command(flatten)]
    source: DataSource,
    #[arg(long, help = "Expected outlier fraction (defaults to config)")]
    contamination: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    HeartRate,
    BloodOxygen,
    Temperature,
    RespirationRate,
}

impl From<MetricArg> for VitalMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::HeartRate => VitalMetric::HeartRate,
            MetricArg::BloodOxygen => VitalMetric::BloodOxygen,
            MetricArg::Temperature => VitalMetric::Temperature,
            MetricArg::RespirationRate => VitalMetric::RespirationRate,
        }
    }
}

#[derive(Args)]
struct ForecastArgs {
    #[command(flatten)]
    source: DataSource,
    #[arg(long, value_enum, default_value = "heart-rate")]
    metric: MetricArg,
    #[arg(long, help = "User whose series is forecast (defaults to the first user)")]
    user: Option<String>,
    #[arg(long)]
    window: Option<usize>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    horizon: Option<usize>,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(long, default_value = "Unknown")]
    user: String,
    #[arg(long)]
    heart_rate: Option<f64>,
    #[arg(long)]
    blood_oxygen: Option<f64>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    respiration_rate: Option<f64>,
}

fn load_or_simulate(config: &AppConfig, source: &DataSource) -> Result<SimulatedSeries> {
    if let Some(path) = &source.input {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let records: Vec<VitalRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse records from {}", path.display()))?;
        return Ok(SimulatedSeries {
            records,
            injected: Vec::new(),
        });
    }

    let sim = &config.simulation;
    let mut generator = VitalGenerator::from_config(sim);
    if let Some(seed) = source.seed {
        generator = generator.with_seed(seed);
    }
    generator
        .generate_multi_user_series(
            source.users.unwrap_or(sim.num_users),
            source.minutes.unwrap_or(sim.minutes_per_user),
            source.rate.unwrap_or(sim.anomaly_rate),
        )
        .context("failed to simulate vital data")
}

fn handle_simulate(config: &AppConfig, args: SimulateArgs, json: bool) -> Result<()> {
    let series = load_or_simulate(config, &args.source)?;

    if let Some(path) = &args.output {
        let body = serde_json::to_string_pretty(&series.records)?;
        fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    }

    if json {
        return print_json(&series);
    }
    println!(
        "Generated {} records ({} injected anomalies)",
        series.len(),
        series.injected.len()
    );
    if let Some(path) = &args.output {
        println!("Saved to {}", path.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct DetectReport {
    metrics: ml::DetectionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<ml::GroundTruthEvaluation>,
    features: Vec<String>,
}

fn handle_detect(config: &AppConfig, args: DetectArgs, json: bool) -> Result<()> {
    let series = load_or_simulate(config, &args.source)?;
    let prepared = ml::preprocess_records(&series.records)?;

    let mut detection = config.detection.clone();
    if let Some(contamination) = args.contamination {
        detection.contamination = contamination;
    }
    let outcome = ml::detect_with_config(&prepared.matrix, &detection)?;

    let evaluation = if series.injected.is_empty() {
        None
    } else {
        Some(ml::evaluate_against_ground_truth(
            &outcome.labels,
            &series.ground_truth(),
        )?)
    };

    let report = DetectReport {
        metrics: outcome.metrics,
        evaluation,
        features: prepared.feature_names(),
    };

    if json {
        return print_json(&report);
    }
    let m = &report.metrics;
    println!("Features: {}", report.features.join(", "));
    println!(
        "Samples {} • anomalies {} • normal {} • {:.2}% (contamination {})",
        m.total_samples, m.anomalies_detected, m.normal_samples, m.anomaly_percentage, m.contamination
    );
    if let (Some(n), Some(pct)) = (m.holdout_samples, m.holdout_anomaly_percentage) {
        println!("Hold-out: {} samples, {:.2}% flagged", n, pct);
    }
    if let Some(eval) = &report.evaluation {
        println!(
            "Against injected anomalies: precision {:.3} • recall {:.3} • F1 {:.3}",
            eval.precision, eval.recall, eval.f1
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ForecastReport {
    backend: &'static str,
    metric: String,
    user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_loss: Option<f64>,
    predictions: Option<Vec<f64>>,
}

fn handle_forecast(config: &AppConfig, args: ForecastArgs, json: bool) -> Result<()> {
    let series = load_or_simulate(config, &args.source)?;
    let Some(first) = series.records.first() else {
        bail!("no records to forecast from");
    };
    let user_id = args.user.clone().unwrap_or_else(|| first.user_id.clone());
    let metric = VitalMetric::from(args.metric);
    let values: Vec<f64> = series
        .records
        .iter()
        .filter(|r| r.user_id == user_id)
        .map(|r| metric.value(r))
        .collect();

    let mut params = TrainingParams::from(&config.forecasting);
    params.window_size = args.window.unwrap_or(params.window_size);
    params.epochs = args.epochs.unwrap_or(params.epochs);
    let horizon = args.horizon.unwrap_or(config.forecasting.horizon);

    let backend = select_backend(&config.forecasting);
    let (predictions, final_loss) = match backend.train(&values, &params)? {
        TrainingOutcome::Trained(model) => {
            let loss = model.history().last().map(|e| e.loss);
            let predictions =
                backend.forecast(Some(model.as_ref()), &values, params.window_size, horizon)?;
            (predictions, loss)
        }
        TrainingOutcome::InsufficientData { required, available } => {
            eprintln!(
                "Not enough data for {}: need {} values, have {}",
                user_id, required, available
            );
            (None, None)
        }
        TrainingOutcome::Unavailable => {
            eprintln!("Forecasting backend is unavailable in this build or configuration");
            (None, None)
        }
    };

    let report = ForecastReport {
        backend: backend.name(),
        metric: metric.to_string(),
        user_id,
        final_loss,
        predictions,
    };

    if json {
        return print_json(&report);
    }
    match &report.predictions {
        Some(values) => {
            println!(
                "{} forecast for {} ({} backend):",
                report.metric, report.user_id, report.backend
            );
            for (step, value) in values.iter().enumerate() {
                println!("  t+{:<3} {:.2}", step + 1, value);
            }
        }
        None => println!("No forecast produced"),
    }
    Ok(())
}

#[derive(Serialize)]
struct CheckReport {
    alerts: Vec<vitalsense::Alert>,
    risks: Vec<String>,
    health_score: f64,
}

fn handle_check(config: &AppConfig, args: CheckArgs, json: bool) -> Result<()> {
    let vitals = VitalsSnapshot {
        user_id: Some(args.user.clone()),
        heart_rate: args.heart_rate,
        blood_oxygen: args.blood_oxygen,
        temperature: args.temperature,
        respiration_rate: args.respiration_rate,
        ..VitalsSnapshot::default()
    };

    let mut engine = AlertEngine::in_memory(config.alert_thresholds.clone());
    let report = CheckReport {
        alerts: engine.check(&vitals, &args.user)?,
        risks: risk::predict_risks(&vitals, &config.risk_thresholds),
        health_score: risk::calculate_health_score(&vitals)?,
    };

    if json {
        return print_json(&report);
    }
    println!("Health score: {:.1}", report.health_score);
    if report.alerts.is_empty() {
        println!("No alerts");
    }
    for alert in &report.alerts {
        println!("- [{}] {}: {}", alert.severity, alert.kind, alert.message);
    }
    for line in &report.risks {
        println!("  risk: {}", line);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
