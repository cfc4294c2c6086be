//! Real-time anomaly detection on ingested samples
//!
//! This module provides:
//! - Fixed-threshold breach detection that bypasses the trained models
//! - Alert emission with deduplication

mod alerter;
mod detector;

pub use alerter::{Alert, AlertSeverity, Alerter, DEFAULT_DEDUP_WINDOW};
pub use detector::{
    Breach, BreachKind, RealTimeAnomalyDetector, ANOMALY_CONFIDENCE, ANOMALY_PROBABILITY,
    ANOMALY_TIME_TO_FAILURE,
};
