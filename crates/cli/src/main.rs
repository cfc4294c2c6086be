//! Failure Prediction Engine CLI
//!
//! A command-line tool for querying predictions, checking engine health,
//! pushing samples and triggering retraining.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{engine, ingest, predictions};

/// Failure Prediction Engine CLI
#[derive(Parser)]
#[command(name = "fpe")]
#[command(author, version, about = "CLI for the Failure Prediction Engine", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via FPE_API_URL env var)
    #[arg(long, env = "FPE_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show current failure predictions
    Predictions {
        /// Only predictions affecting this component
        #[arg(long, short)]
        component: Option<String>,

        /// Minimum probability (0-1)
        #[arg(long)]
        min_probability: Option<f64>,

        /// Show trigger metrics and recommended actions
        #[arg(long)]
        actions: bool,
    },

    /// Show model performance from the last training pass
    Performance,

    /// Show engine status and model state
    Status,

    /// Show engine health and readiness
    Health,

    /// Trigger a training pass now
    Retrain,

    /// Push data into the engine
    #[command(subcommand)]
    Ingest(IngestCommands),
}

#[derive(Subcommand)]
pub enum IngestCommands {
    /// Push a metrics sample
    Metric(ingest::MetricArgs),

    /// Push an error event
    Error(ingest::ErrorArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = config::Config::load()?;
    let api_url = settings.resolve_api_url(cli.api_url.as_deref());
    let format = cli
        .format
        .or_else(|| {
            settings
                .default_format
                .as_deref()
                .and_then(|f| output::OutputFormat::from_str(f, true).ok())
        })
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;
    if cli.verbose {
        output::print_info(&format!("Using engine at {}", client.base_url()));
    }

    // Execute command
    match cli.command {
        Commands::Predictions {
            component,
            min_probability,
            actions,
        } => {
            predictions::show_predictions(&client, component, min_probability, actions, format)
                .await?;
        }
        Commands::Performance => predictions::show_performance(&client, format).await?,
        Commands::Status => engine::show_status(&client, format).await?,
        Commands::Health => engine::show_health(&client, format).await?,
        Commands::Retrain => engine::retrain(&client, format).await?,
        Commands::Ingest(ingest_cmd) => match ingest_cmd {
            IngestCommands::Metric(args) => ingest::ingest_metric(&client, args, format).await?,
            IngestCommands::Error(args) => ingest::ingest_error(&client, args, format).await?,
        },
    }

    Ok(())
}
