// Threshold alerting with an owned, append-only history
pub mod alerts;

// Advisory risk rules and health score
pub mod risk;

// Personal baselines and insights
pub mod insights;

// Dashboard metric summaries
pub mod summary;

pub use alerts::{check_vitals, evaluate_vitals, AlertEngine, AlertLog, InMemoryAlertLog};
pub use insights::{calculate_baseline, generate_insights, PersonalBaseline};
pub use risk::{assess_risks, calculate_health_score, predict_risks, RiskFinding};
pub use summary::{summarize_metrics, MetricSummary, MetricsOverview, Trend, VitalMetric};
