//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::KeeperError;
use crate::server::handlers::{
    current_handler, deployment_handler, deployments_handler, health_check_handler,
    health_handler, metrics_handler, rollback_handler, version_handler,
};
use crate::server::state::ServerState;
use crate::server::webhook::deploy_webhook_handler;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/deployments", get(deployments_handler))
        .route("/deployments/current", get(current_handler))
        .route("/deployments/{id}", get(deployment_handler))
        .route("/deployments/{id}/rollback", post(rollback_handler))
        .route("/deployments/{id}/health-check", post(health_check_handler))
        // Webhooks
        .route("/webhooks/deploy", post(deploy_webhook_handler))
        // Telemetry
        .route("/metrics", get(metrics_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), KeeperError>>, KeeperError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| KeeperError::ServerError(format!("binding {} failed: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| KeeperError::ServerError(e.to_string()))
    });

    Ok(handle)
}
