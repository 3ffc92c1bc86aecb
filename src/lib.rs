//! VitalSense analytics library
//!
//! Core analytics over per-user vital-sign streams: synthetic data
//! generation, feature preprocessing, isolation-forest anomaly detection,
//! sequence forecasting, and deterministic alert/risk rules.
//!
//! Everything is synchronous and call-and-return. Callers own storage and
//! presentation; this crate takes plain records in and hands plain results
//! back.
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod ml;
pub mod models;
pub mod notifications;
pub mod services;
pub mod simulation;

pub use config::{AlertThresholds, AppConfig, RiskThresholds};
pub use errors::ServiceError;
pub use models::{ActivityLevel, Alert, AlertKind, AlertSeverity, VitalRecord, VitalsSnapshot};
pub use simulation::{SimulatedSeries, VitalGenerator};

/// True when the recurrent forecasting backend is compiled in.
pub const FORECASTING_COMPILED: bool = cfg!(feature = "forecasting");
