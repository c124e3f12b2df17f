//! Release Keeper API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Push notification accepted on the deploy webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub revision: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default = "default_initiator")]
    pub initiated_by: String,
}

fn default_initiator() -> String {
    "webhook".to_string()
}

/// Webhook acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<serde_json::Value>,
}

impl WebhookResponse {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: "skipped".to_string(),
            reason: Some(reason.into()),
            deployment: None,
        }
    }

    pub fn accepted(deployment: serde_json::Value) -> Self {
        Self {
            status: "accepted".to_string(),
            reason: None,
            deployment: Some(deployment),
        }
    }
}

/// Rollback acknowledgement; the rollback itself finishes in the background
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub status: String,
    pub id: String,
    pub message: String,
}

/// Health check outcome for one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub id: String,
    pub healthy: bool,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
