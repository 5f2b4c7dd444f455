//! HTTP API: extender verbs, health checks, Prometheus metrics and debug views

use crate::Scheduler;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scheduler_lib::{
    extender::{Extender, ExtenderArgs},
    health::HealthRegistry,
    observability::SchedulerMetrics,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SchedulerMetrics,
    pub scheduler: Arc<Scheduler>,
    pub extender: Extender,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: SchedulerMetrics,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        let extender = Extender::new(scheduler.clone(), health_registry.clone());
        Self {
            health_registry,
            metrics,
            scheduler,
            extender,
        }
    }
}

/// 200 while operational (degraded included), 503 once unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus exposition, agent gauges refreshed at scrape time
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.scheduler.stats().await;
    state
        .metrics
        .set_agent_state(stats.agent.memory_len, stats.agent.epsilon);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Extender `prioritize` verb
async fn prioritize(
    State(state): State<Arc<AppState>>,
    Json(args): Json<ExtenderArgs>,
) -> impl IntoResponse {
    Json(state.extender.prioritize(&args).await)
}

async fn debug_agent(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.stats().await)
}

async fn debug_rewards(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.reward_summaries())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/prioritize", post(prioritize))
        .route("/debug/agent", get(debug_agent))
        .route("/debug/rewards", get(debug_rewards))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
