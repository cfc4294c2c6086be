//! Alert emission for threshold breaches
//!
//! Handles:
//! - Publishing alerts on a broadcast channel for notification consumers
//! - Logging each alert with its severity
//! - Deduplication of repeated alerts within a configurable window

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{Breach, BreachKind};
use crate::models::FailurePrediction;

/// Default deduplication window (15 minutes)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Alerts buffered per subscriber before slow consumers start lagging
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Notification handed to external consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub prediction_id: String,
    pub timestamp: i64,
    pub severity: AlertSeverity,
    pub breaches: Vec<BreachKind>,
    pub summary: String,
}

/// Breach set used as the deduplication key
type DedupKey = Vec<BreachKind>;

pub struct Alerter {
    dedup_window: Duration,
    recent_alerts: Mutex<HashMap<DedupKey, Instant>>,
    sender: broadcast::Sender<Alert>,
}

impl Default for Alerter {
    fn default() -> Self {
        Self::new()
    }
}

impl Alerter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            recent_alerts: Mutex::new(HashMap::new()),
            sender,
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }

    fn recent(&self) -> MutexGuard<'_, HashMap<DedupKey, Instant>> {
        // The map holds only timestamps, so a poisoned lock is still usable
        self.recent_alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(breaches: &[Breach]) -> DedupKey {
        let mut key: DedupKey = breaches.iter().map(|b| b.kind).collect();
        key.sort();
        key.dedup();
        key
    }

    pub fn should_suppress(&self, breaches: &[Breach]) -> bool {
        self.recent()
            .get(&Self::key(breaches))
            .map(|last| last.elapsed() < self.dedup_window)
            .unwrap_or(false)
    }

    fn record_alert(&self, breaches: &[Breach]) {
        let mut recent = self.recent();
        recent.insert(Self::key(breaches), Instant::now());
        recent.retain(|_, time| time.elapsed() < self.dedup_window);
    }

    /// Publish an alert for a breach prediction unless an identical breach
    /// set was alerted on within the dedup window
    pub fn publish(&self, prediction: &FailurePrediction, breaches: &[Breach]) -> Option<Alert> {
        if breaches.is_empty() {
            return None;
        }
        if self.should_suppress(breaches) {
            debug!(prediction_id = %prediction.id, "Duplicate alert suppressed");
            return None;
        }

        let severity = if breaches.len() > 1 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        let alert = Alert {
            prediction_id: prediction.id.clone(),
            timestamp: prediction.timestamp,
            severity,
            breaches: Self::key(breaches),
            summary: prediction.affected_components.join("; "),
        };

        match severity {
            AlertSeverity::Critical => warn!(
                event = "alert_emitted",
                severity = %severity,
                summary = %alert.summary,
                "Critical performance alert"
            ),
            AlertSeverity::Warning => info!(
                event = "alert_emitted",
                severity = %severity,
                summary = %alert.summary,
                "Performance alert"
            ),
        }

        self.record_alert(breaches);
        // No subscribers is fine; the log line above still carries the alert
        let _ = self.sender.send(alert.clone());
        Some(alert)
    }
}
