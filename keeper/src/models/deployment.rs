//! Deployment record model

use chrono::{DateTime, Utc};
use openapi_client::models::DeploymentSummary;
use serde::{Deserialize, Serialize};

/// Number of characters a revision is canonicalized to
pub const REVISION_PREFIX_LEN: usize = 7;

/// Lifecycle status of a deployment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Recorded, nothing has run yet
    Pending,

    /// Deploy action in progress
    Deploying,

    /// Passed its health check
    Success,

    /// Failed its health check or deploy action
    Failed,

    /// Replaced by a rollback; terminal
    RolledBack,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }

    /// Whether the record is still waiting on a deploy or probe outcome
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DeploymentStatus::Pending | DeploymentStatus::Deploying)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to make a specific revision live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Unique deployment ID
    pub id: String,

    /// Canonical short revision
    pub revision: String,

    /// Branch or stream the revision came from
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Human or automated actor that triggered the deployment
    pub initiated_by: String,

    pub created_at: DateTime<Utc>,

    pub status: DeploymentStatus,

    /// Unset until a health probe has run
    #[serde(default)]
    pub health_check_passed: Option<bool>,

    #[serde(default)]
    pub rollback_eligible: bool,

    /// Record that was current when this one started (id only)
    #[serde(default)]
    pub previous_id: Option<String>,
}

impl DeploymentRecord {
    /// Create a new record with a fresh ID
    pub fn new(
        revision: &str,
        git_ref: &str,
        initiated_by: &str,
        status: DeploymentStatus,
        previous_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            revision: canonical_revision(revision),
            git_ref: git_ref.to_string(),
            initiated_by: initiated_by.to_string(),
            created_at: Utc::now(),
            status,
            health_check_passed: None,
            rollback_eligible: false,
            previous_id,
        }
    }

    pub fn summary(&self) -> DeploymentSummary {
        DeploymentSummary {
            id: self.id.clone(),
            revision: self.revision.clone(),
            git_ref: self.git_ref.clone(),
            initiated_by: self.initiated_by.clone(),
            status: self.status.as_str().to_string(),
            previous_id: self.previous_id.clone(),
        }
    }
}

/// Trim a revision and cut it to [`REVISION_PREFIX_LEN`] characters
pub fn canonical_revision(revision: &str) -> String {
    revision.trim().chars().take(REVISION_PREFIX_LEN).collect()
}
