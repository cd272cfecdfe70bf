//! HTTP endpoints

use crate::{
    aggregator::{Aggregator, HealthReport},
    errors::Error,
    gateway::{Gateway, Scope},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const ALL_HEALTHY: &str = "All deployments are healthy";

/// Dependencies of the handlers
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub gateway: Arc<dyn Gateway>,
    /// Cancelled on shutdown
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/deployment-health", get(deployment_health))
        .route("/kube-api-health", get(kube_api_health))
        .with_state(state)
}

/// Liveness of the process itself
async fn healthz() -> &'static str {
    "ok"
}

async fn deployment_health(State(state): State<AppState>) -> Response {
    match state.aggregator.aggregate(&Scope::All, &state.shutdown).await {
        Ok(HealthReport::AllHealthy) => ALL_HEALTHY.into_response(),
        Ok(HealthReport::Unhealthy(records)) => Json(records).into_response(),
        Err(err) => {
            tracing::error!("Deployment health check failed: {}", err);
            let body = match &err {
                Error::GatewayUnavailable(_) => format!("Error listing deployments: {}", err),
                _ => format!("Deployment health check failed: {}", err),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

async fn kube_api_health(State(state): State<AppState>) -> Response {
    match crate::version::kubernetes_version(&*state.gateway).await {
        Ok(_) => "Kubernetes API server is reachable".into_response(),
        Err(err) => {
            tracing::warn!("Kubernetes API server is unreachable: {:#}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Kubernetes API server is unreachable: {:#}", err),
            )
                .into_response()
        }
    }
}
