//! Inbound deploy webhook

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{ErrorResponse, WebhookPayload, WebhookResponse};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::server::handlers::ApiError;
use crate::server::state::{ServerState, WebhookGate};
use crate::utils::secrets_match;

const BRANCH_PREFIX: &str = "refs/heads/";

fn reject(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

/// Check the bearer secret; `Err` carries the rejection response
fn authorize(gate: &WebhookGate, headers: &HeaderMap) -> Result<(), Response> {
    let Some(secret) = &gate.secret else {
        return Err(reject(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_configured",
            "webhook secret is not configured",
        ));
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    match token {
        None => Err(reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing bearer token",
        )),
        Some(token) if !secrets_match(token, secret.expose_secret()) => Err(reject(
            StatusCode::FORBIDDEN,
            "forbidden",
            "invalid webhook secret",
        )),
        Some(_) => Ok(()),
    }
}

/// Whether a pushed ref targets one of the release branches
pub fn is_release_ref(git_ref: &str, release_branches: &[String]) -> bool {
    let branch = git_ref.strip_prefix(BRANCH_PREFIX).unwrap_or(git_ref);
    release_branches.iter().any(|b| b == branch)
}

/// Start a deployment for pushes to a release branch
pub async fn deploy_webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = authorize(&state.webhook, &headers) {
        warn!("Rejected deploy webhook with status {}", rejection.status());
        return rejection;
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return reject(
                StatusCode::BAD_REQUEST,
                "bad_request",
                &format!("invalid payload: {}", e),
            )
        }
    };

    if !is_release_ref(&payload.git_ref, &state.webhook.release_branches) {
        info!("Skipping push to {} ({})", payload.git_ref, payload.revision);
        return Json(WebhookResponse::skipped("non-release branch")).into_response();
    }

    let record = match state
        .orchestrator
        .start(&payload.revision, &payload.git_ref, &payload.initiated_by)
        .await
    {
        Ok(record) => record,
        Err(e) => return ApiError(e).into_response(),
    };

    if state.webhook.run_deployer {
        let orchestrator = state.orchestrator.clone();
        let id = record.id.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute(&id).await {
                error!("Deployment {} did not complete: {}", id, e);
            }
        });
    }

    let deployment = match serde_json::to_value(&record) {
        Ok(value) => value,
        Err(e) => return ApiError(e.into()).into_response(),
    };
    (StatusCode::ACCEPTED, Json(WebhookResponse::accepted(deployment))).into_response()
}
