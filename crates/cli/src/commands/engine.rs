//! Engine status, health and retraining commands

use anyhow::Result;
use colored::Colorize;
use engine_lib::{EngineStatus, HealthResponse, ReadinessResponse, TrainingOutcome};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_percent, format_timestamp, print_heading, print_info, print_json,
    print_success, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Model")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Checked")]
    checked: String,
}

/// Show engine status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: EngineStatus = client.get("api/v1/status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_heading("Engine Status", 50);
            println!("Metric Samples:         {}", status.metric_samples);
            println!("Error Events:           {}", status.error_events);
            println!("Exposed Predictions:    {}", status.exposed_predictions);
            println!("Window Size:            {}", status.window_size);
            println!(
                "Confidence Threshold:   {}",
                format_percent(status.confidence_threshold)
            );
            println!(
                "Last Training:          {}",
                status
                    .last_training
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string())
            );
            if status.training_in_progress {
                println!("Training:               {}", "in progress".yellow());
            }
            println!();

            let rows: Vec<ModelRow> = status
                .models
                .iter()
                .map(|m| ModelRow {
                    component: m.component.clone(),
                    kind: m.kind.to_string(),
                    state: color_status(if m.trained { "trained" } else { "heuristic" }),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show liveness and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get_with_status("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_with_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            print_heading("Engine Health", 60);
            let overall = serde_json::to_value(health.status)?;
            println!(
                "Status:   {}",
                color_status(overall.as_str().unwrap_or("unknown"))
            );
            println!(
                "Ready:    {}",
                color_status(if readiness.ready { "ready" } else { "not ready" })
            );
            if let Some(reason) = &readiness.reason {
                println!("Reason:   {}", reason);
            }
            println!();

            let rows = health
                .components
                .iter()
                .map(|(name, component)| {
                    let status = serde_json::to_value(component.status)?;
                    Ok(HealthRow {
                        component: name.clone(),
                        status: color_status(status.as_str().unwrap_or("unknown")),
                        message: component.message.clone().unwrap_or_default(),
                        checked: format_timestamp(component.last_check_timestamp),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Trigger a training pass
pub async fn retrain(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let outcome: TrainingOutcome = client.post_empty("api/v1/retrain").await?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }

    match &outcome {
        TrainingOutcome::Completed(report) if report.success => {
            print_success(&format!(
                "Trained on {} examples ({} positive) in {:.2}s",
                report.examples, report.positives, report.duration_secs
            ));
        }
        TrainingOutcome::Completed(report) => {
            print_warning("Training finished with failures; previous models kept");
            for result in report.results.iter().filter(|r| !r.success) {
                println!(
                    "  {} ({}): {}",
                    result.component,
                    result.kind,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        TrainingOutcome::InsufficientData { needed, have } => {
            print_warning(&format!(
                "Not enough history to train: {} examples, need {}",
                have, needed
            ));
            print_info("Keep ingesting metrics and try again later");
        }
        TrainingOutcome::AlreadyRunning => {
            print_info("A training pass is already running");
        }
        TrainingOutcome::Aborted { reason } => {
            print_warning(&format!("Training aborted: {}", reason));
        }
    }

    Ok(())
}
