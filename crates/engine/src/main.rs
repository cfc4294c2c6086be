//! Failure prediction engine service
//!
//! Accepts metrics and error events over HTTP, keeps a rolling history,
//! raises threshold anomalies immediately and runs periodic forecasting
//! and retraining in the background.

use anyhow::Result;
use engine_lib::FailureEngine;
use failure_engine::{api, config::EngineSettings};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting failure-engine");

    let settings = EngineSettings::load()?;
    let model_config = settings.model_config()?;
    info!(
        instance = %settings.instance,
        model_type = %model_config.model_type,
        window_size = model_config.window_size,
        "Engine configured"
    );

    let engine = Arc::new(FailureEngine::with_options(
        model_config,
        settings.engine_options()?,
    )?);
    engine
        .logger()
        .log_startup(ENGINE_VERSION, &engine.config().components);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let loops = engine.spawn_loops(&shutdown_tx).await;

    let app_state = Arc::new(api::AppState::new(engine.clone()));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(settings.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    engine.logger().log_shutdown("SIGINT received");
    info!("Shutting down");

    engine.health().set_ready(false).await;
    let _ = shutdown_tx.send(());

    for handle in loops {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background loop ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with an error"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    Ok(())
}
