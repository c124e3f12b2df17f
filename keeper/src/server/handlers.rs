//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{
    ErrorResponse, HealthCheckResponse, HealthResponse, RollbackResponse, VersionResponse,
};
use tracing::{error, info, warn};

use crate::errors::KeeperError;
use crate::models::deployment::DeploymentRecord;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error returned by handlers, rendered as an [`ErrorResponse`]
#[derive(Debug)]
pub struct ApiError(pub KeeperError);

impl From<KeeperError> for ApiError {
    fn from(err: KeeperError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            KeeperError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            KeeperError::PreconditionFailed(_) | KeeperError::InvalidTransition(_) => {
                (StatusCode::CONFLICT, "conflict")
            }
            KeeperError::PersistenceFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failed")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(ErrorResponse::new(code, self.0.to_string()))).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "release-keeper".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// All deployments, most recent first
pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> Json<Vec<DeploymentRecord>> {
    Json(state.orchestrator.list_all().await)
}

/// Current release
pub async fn current_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    Ok(Json(state.orchestrator.current().await?))
}

/// One deployment by id
pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    Ok(Json(state.orchestrator.get(&id).await?))
}

/// Start a rollback in the background once its preconditions hold
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<RollbackResponse>, ApiError> {
    state.orchestrator.rollback_precheck(&id).await?;

    info!("Rollback of {} requested", id);
    let orchestrator = state.orchestrator.clone();
    let target = id.clone();
    tokio::spawn(async move {
        orchestrator.rollback(&target).await;
    });

    Ok(Json(RollbackResponse {
        status: "initiated".to_string(),
        message: format!("Rollback of {} initiated", id),
        id,
    }))
}

/// Probe the service for one deployment; rolls back when unhealthy and
/// automatic rollback is enabled
pub async fn health_check_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<HealthCheckResponse>, ApiError> {
    let healthy = state.orchestrator.health_check(&id).await?;

    if !healthy && state.orchestrator.auto_rollback() {
        match state.orchestrator.rollback_precheck(&id).await {
            Ok(()) => {
                let orchestrator = state.orchestrator.clone();
                let target = id.clone();
                tokio::spawn(async move {
                    orchestrator.rollback(&target).await;
                });
            }
            Err(e) => warn!("Not rolling back unhealthy deployment {}: {}", id, e),
        }
    }

    Ok(Json(HealthCheckResponse { id, healthy }))
}

/// Prometheus metrics
pub async fn metrics_handler(State(state): State<Arc<ServerState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("not_found", "metrics recorder not installed")),
        )
            .into_response(),
    }
}
