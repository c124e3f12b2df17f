//! Finite state machine for deployment records

use crate::errors::KeeperError;
use crate::models::deployment::DeploymentStatus;

/// Validate a status change and return the resulting status.
///
/// Health checks may be repeated, so `Success` and `Failed` can be
/// re-applied or swapped. `RolledBack` accepts nothing.
pub fn transition(
    from: DeploymentStatus,
    to: DeploymentStatus,
) -> Result<DeploymentStatus, KeeperError> {
    use DeploymentStatus::*;

    let allowed = match (from, to) {
        // From Pending
        (Pending, Pending) => true,
        (Pending, Deploying) => true,
        (Pending, Success | Failed) => true,

        // From Deploying
        (Deploying, Deploying) => true,
        (Deploying, Success | Failed) => true,

        // Probe re-evaluation
        (Success | Failed, Success | Failed) => true,

        // Any live record can be rolled back
        (Pending | Deploying | Success | Failed, RolledBack) => true,

        // Terminal and backwards moves
        (RolledBack, _) => false,
        (Success | Failed, Pending | Deploying) => false,
        (Deploying, Pending) => false,
    };

    if allowed {
        Ok(to)
    } else {
        Err(KeeperError::InvalidTransition(format!("{} -> {}", from, to)))
    }
}

/// Whether a record in this status may be rolled back
pub fn can_roll_back(status: DeploymentStatus) -> bool {
    transition(status, DeploymentStatus::RolledBack).is_ok()
}
