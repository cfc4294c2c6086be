//! Prediction and model performance commands

use anyhow::Result;
use colored::Colorize;
use engine_lib::{FailurePrediction, ModelPerformance};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_probability, color_status, format_minutes, format_percent, format_timestamp,
    print_heading, print_json, print_warning, OutputFormat,
};

/// Row for predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Type")]
    prediction_type: String,
    #[tabled(rename = "Probability")]
    probability: String,
    #[tabled(rename = "ETA")]
    time_to_failure: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Components")]
    components: String,
}

impl From<&FailurePrediction> for PredictionRow {
    fn from(p: &FailurePrediction) -> Self {
        Self {
            id: truncate_id(&p.id),
            timestamp: format_timestamp(p.timestamp),
            prediction_type: p.prediction_type.to_string(),
            probability: color_probability(p.probability),
            time_to_failure: format_minutes(p.time_to_failure),
            severity: color_status(&p.severity.to_string()),
            components: p.affected_components.join(", "),
        }
    }
}

/// Keep predictions for `component` at or above `min_probability`
pub fn filter_predictions(
    predictions: Vec<FailurePrediction>,
    component: Option<&str>,
    min_probability: Option<f64>,
) -> Vec<FailurePrediction> {
    predictions
        .into_iter()
        .filter(|p| component.map_or(true, |c| p.affected_components.iter().any(|a| a == c)))
        .filter(|p| min_probability.map_or(true, |min| p.probability >= min))
        .collect()
}

/// Show the currently exposed predictions
pub async fn show_predictions(
    client: &ApiClient,
    component: Option<String>,
    min_probability: Option<f64>,
    show_actions: bool,
    format: OutputFormat,
) -> Result<()> {
    let predictions: Vec<FailurePrediction> = client.get("api/v1/predictions").await?;
    let predictions = filter_predictions(predictions, component.as_deref(), min_probability);

    match format {
        OutputFormat::Json => print_json(&predictions)?,
        OutputFormat::Table => {
            if predictions.is_empty() {
                print_warning("No failure predictions at the moment");
                return Ok(());
            }

            let rows: Vec<PredictionRow> = predictions.iter().map(PredictionRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} predictions", predictions.len());

            if show_actions {
                for p in &predictions {
                    println!();
                    println!("{} {}", "Prediction".bold(), p.id.cyan());
                    for (metric, value) in &p.trigger_metrics {
                        println!("  {:<20} {:.2}", metric, value);
                    }
                    for action in &p.recommended_actions {
                        println!("  - {}", action);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Show model performance figures from the last training pass
pub async fn show_performance(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let perf: ModelPerformance = client.get("api/v1/performance").await?;

    match format {
        OutputFormat::Json => print_json(&perf)?,
        OutputFormat::Table => {
            print_heading("Model Performance", 50);
            match perf.last_training {
                Some(ts) => println!("Last Training:          {}", format_timestamp(ts)),
                None => {
                    print_warning("Models have not been trained yet");
                    return Ok(());
                }
            }
            println!("Training Examples:      {}", perf.data_points);
            println!("Positive Examples:      {}", perf.positive_examples);
            println!();
            println!("Accuracy:               {}", format_percent(perf.accuracy));
            println!("Precision:              {}", format_percent(perf.precision));
            println!("Recall:                 {}", format_percent(perf.recall));
            println!("F1:                     {}", format_percent(perf.f1));
            if perf.estimate {
                println!();
                println!("{}", "Measured on training data".dimmed());
            }
        }
    }

    Ok(())
}

/// Truncate ID for display
fn truncate_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_lib::{PredictionSeverity, PredictionType};
    use std::collections::BTreeMap;

    fn prediction(component: &str, probability: f64) -> FailurePrediction {
        FailurePrediction {
            id: format!("{}-prediction", component),
            timestamp: 1_700_000_000,
            prediction_type: PredictionType::ComponentFailure,
            probability,
            time_to_failure: 25.0,
            affected_components: vec![component.to_string()],
            severity: PredictionSeverity::High,
            recommended_actions: vec![],
            confidence: 0.8,
            trigger_metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn test_filter_by_component_and_probability() {
        let all = vec![
            prediction("network", 0.95),
            prediction("system", 0.75),
            prediction("network", 0.72),
        ];

        let network = filter_predictions(all.clone(), Some("network"), None);
        assert_eq!(network.len(), 2);

        let likely = filter_predictions(all.clone(), None, Some(0.9));
        assert_eq!(likely.len(), 1);
        assert_eq!(likely[0].probability, 0.95);

        assert_eq!(filter_predictions(all, None, None).len(), 3);
    }

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("abcdefghijk"), "abcdefgh...");
        assert_eq!(truncate_id("short"), "short");
    }

    #[tokio::test]
    async fn test_show_predictions_against_mock_engine() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::to_string(&vec![prediction("network", 0.9)]).unwrap();
        let mock = server
            .mock("GET", "/api/v1/predictions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        show_predictions(&client, None, None, true, OutputFormat::Table)
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
