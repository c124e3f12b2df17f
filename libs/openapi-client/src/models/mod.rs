//! Outbound wire models
//!
//! Shapes of the payloads Release Keeper reads from the deployed service's
//! liveness endpoint and posts to notification channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status tokens a liveness endpoint may answer with to be considered up
pub const HEALTHY_STATUS_TOKENS: [&str; 2] = ["ok", "healthy"];

/// Body returned by the deployed service's liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,

    /// Advisory storage connectivity indicator, e.g. "connected"
    #[serde(default)]
    pub database: Option<String>,
}

impl LivenessResponse {
    /// Whether the status field carries one of the recognized tokens
    pub fn is_ok(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        HEALTHY_STATUS_TOKENS.contains(&status.as_str())
    }
}

/// Lifecycle event broadcast for a deployment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started,
    Deploying,
    Completed,
    Failed,
    RolledBack,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Started => "started",
            LifecycleEvent::Deploying => "deploying",
            LifecycleEvent::Completed => "completed",
            LifecycleEvent::Failed => "failed",
            LifecycleEvent::RolledBack => "rolled_back",
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Deployment snapshot carried inside a lifecycle notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub id: String,
    pub revision: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub initiated_by: String,
    pub status: String,
    pub previous_id: Option<String>,
}

/// Payload posted to generic webhook channels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Deployment {
        event: LifecycleEvent,
        deployment: DeploymentSummary,
        timestamp: DateTime<Utc>,
    },
    Alert {
        severity: Severity,
        title: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    /// One-line human readable rendering, used by chat channels
    pub fn to_text(&self) -> String {
        match self {
            Notification::Deployment {
                event, deployment, ..
            } => format!(
                "[deploy] {} {} ({}) by {} -> {}",
                deployment.revision,
                event.as_str(),
                deployment.git_ref,
                deployment.initiated_by,
                deployment.status
            ),
            Notification::Alert {
                severity,
                title,
                message,
                ..
            } => format!("[{}] {}: {}", severity.as_str(), title, message),
        }
    }
}

/// Slack-compatible incoming webhook body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
}
