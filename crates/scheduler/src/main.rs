//! DRL Scheduler - learned node scoring for kube-scheduler
//!
//! Runs as a scheduler extender: kube-scheduler posts each pod's candidate
//! nodes to `/prioritize` and receives per-node priorities from a DQN agent
//! that keeps learning from its own placements.

use anyhow::{Context, Result};
use drl_scheduler::{api, build_scheduler, config::SchedulerConfig};
use scheduler_lib::{
    collector::PrometheusSource,
    health::HealthRegistry,
    observability::{SchedulerMetrics, StructuredLogger},
    plugin::PLUGIN_NAME,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting drl-scheduler");

    let config = SchedulerConfig::load()?;
    info!(
        api_port = config.api_port,
        prometheus_address = %config.prometheus_address,
        batch_size = config.batch_size,
        learning_target = ?config.learning_target,
        "Scheduler configured"
    );

    let health_registry = HealthRegistry::with_failure_threshold(config.failure_threshold);
    health_registry.register_all().await;

    let metrics = SchedulerMetrics::new();
    let logger = StructuredLogger::new(PLUGIN_NAME);

    let source = PrometheusSource::new(&config.prometheus_address, config.query_timeout())
        .context("Failed to create Prometheus source")?;
    let scheduler = build_scheduler(&config, Arc::new(source), health_registry.clone())?;
    let scheduler = Arc::new(scheduler);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        scheduler,
    ));

    logger.log_startup(SCHEDULER_VERSION, &config.prometheus_address);
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API server task panicked");
                    return Err(e).context("API server task failed");
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
