//! HTTP API for health checks, Prometheus metrics and read-only status

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use supervisor_lib::{ComponentStatus, EdgeTarget, StaticPage, Supervisor};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }
}

#[derive(Debug, Serialize)]
pub struct EdgeTargetList {
    pub targets: Vec<EdgeTarget>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct PageList {
    pub pages: Vec<StaticPage>,
    pub total: usize,
}

/// 200 if healthy or degraded, 503 if any component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.supervisor.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.supervisor.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest cluster snapshot; 503 until the first fast tick completes
async fn cluster_status(State(state): State<Arc<AppState>>) -> Response {
    match state.supervisor.cluster_status().await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => {
            let reason = if state.supervisor.cluster().is_some() {
                "no cluster snapshot collected yet"
            } else {
                "cluster supervision is not running in this process"
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": reason })),
            )
                .into_response()
        }
    }
}

async fn edge_targets(State(state): State<Arc<AppState>>) -> Json<EdgeTargetList> {
    let targets = state.supervisor.edge_target_status();
    Json(EdgeTargetList {
        total: targets.len(),
        targets,
    })
}

async fn pages(State(state): State<Arc<AppState>>) -> Json<PageList> {
    let pages = state.supervisor.static_page_status().await;
    Json(PageList {
        total: pages.len(),
        pages,
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/cluster", get(cluster_status))
        .route("/api/v1/edge/targets", get(edge_targets))
        .route("/api/v1/pages", get(pages))
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
