//! Ingestion commands: push a metrics sample or an error event

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use engine_lib::{ErrorEvent, ErrorSeverity, MetricsSample};
use std::path::PathBuf;

use crate::client::{ApiClient, IngestResponse};
use crate::output::{
    color_probability, color_status, print_json, print_success, print_warning, OutputFormat,
};

/// Metrics sample fields; unset values default to zero
#[derive(Debug, Args)]
pub struct MetricArgs {
    /// Read the sample as JSON from a file instead of flags
    #[arg(long, conflicts_with_all = ["cpu", "memory", "latency"])]
    pub file: Option<PathBuf>,

    /// Unix timestamp in seconds (defaults to now)
    #[arg(long)]
    pub timestamp: Option<i64>,

    /// CPU usage percent
    #[arg(long, default_value_t = 0.0)]
    pub cpu: f64,

    /// Memory usage percent
    #[arg(long, default_value_t = 0.0)]
    pub memory: f64,

    /// Network latency in milliseconds
    #[arg(long, default_value_t = 0.0)]
    pub latency: f64,

    #[arg(long, default_value_t = 0.0)]
    pub connections: f64,

    /// Error rate percent
    #[arg(long, default_value_t = 0.0)]
    pub error_rate: f64,

    /// Response time in milliseconds
    #[arg(long, default_value_t = 0.0)]
    pub response_time: f64,

    /// Temperature in degrees Celsius
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f64,

    /// Disk usage percent
    #[arg(long, default_value_t = 0.0)]
    pub disk: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for ErrorSeverity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => ErrorSeverity::Low,
            SeverityArg::Medium => ErrorSeverity::Medium,
            SeverityArg::High => ErrorSeverity::High,
            SeverityArg::Critical => ErrorSeverity::Critical,
        }
    }
}

#[derive(Debug, Args)]
pub struct ErrorArgs {
    /// Kind tag, e.g. network_timeout
    #[arg(long)]
    pub kind: String,

    /// Originating component
    #[arg(long)]
    pub component: String,

    #[arg(long, value_enum, default_value = "medium")]
    pub severity: SeverityArg,

    #[arg(long, default_value = "")]
    pub message: String,

    /// Event ID (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Unix timestamp in seconds (defaults to now)
    #[arg(long)]
    pub timestamp: Option<i64>,
}

impl MetricArgs {
    pub fn into_sample(self) -> Result<MetricsSample> {
        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&content).context("Failed to parse metrics sample");
        }

        Ok(MetricsSample {
            timestamp: self.timestamp.unwrap_or_else(now),
            cpu_usage: self.cpu,
            memory_usage: self.memory,
            network_latency: self.latency,
            active_connections: self.connections,
            error_rate: self.error_rate,
            response_time: self.response_time,
            temperature: self.temperature,
            disk_usage: self.disk,
        })
    }
}

impl ErrorArgs {
    pub fn into_event(self) -> ErrorEvent {
        ErrorEvent {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind: self.kind,
            severity: self.severity.into(),
            message: self.message,
            timestamp: self.timestamp.unwrap_or_else(now),
            component: self.component,
            context: None,
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Push one metrics sample
pub async fn ingest_metric(client: &ApiClient, args: MetricArgs, format: OutputFormat) -> Result<()> {
    let sample = args.into_sample()?;
    let response: IngestResponse = client.post("api/v1/metrics", &sample).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Metrics sample at {} accepted", sample.timestamp));
            if let Some(anomaly) = &response.anomaly {
                print_warning(&format!(
                    "Anomaly raised: {} ({}, {})",
                    anomaly.prediction_type,
                    color_probability(anomaly.probability),
                    color_status(&anomaly.severity.to_string())
                ));
                for action in &anomaly.recommended_actions {
                    println!("  - {}", action);
                }
            }
        }
    }

    Ok(())
}

/// Push one error event
pub async fn ingest_error(client: &ApiClient, args: ErrorArgs, format: OutputFormat) -> Result<()> {
    let event = args.into_event();
    let response: IngestResponse = client.post("api/v1/errors", &event).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Error event {} accepted", event.id));
        }
    }

    Ok(())
}
