// Vital-sign domain models
pub mod alert;
pub mod vital_record;
pub mod vitals_snapshot;

pub use alert::{Alert, AlertKind, AlertSeverity};
pub use vital_record::{ActivityLevel, VitalRecord};
pub use vitals_snapshot::VitalsSnapshot;
