//! Git checkout of release revisions

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::deploy::process::run_with_timeout;
use crate::errors::KeeperError;

/// Check out `revision` in the working copy at `workdir`.
///
/// Fetches first so revisions pushed after the last deploy resolve; a failed
/// fetch is only logged because the revision may already be present locally.
pub async fn checkout_revision(
    workdir: &Path,
    revision: &str,
    timeout: Duration,
) -> Result<(), KeeperError> {
    if revision.is_empty() || revision.starts_with('-') {
        return Err(KeeperError::ExternalActionFailed(format!(
            "Refusing to check out revision {:?}",
            revision
        )));
    }
    if !workdir.exists() {
        return Err(KeeperError::ExternalActionFailed(format!(
            "Working copy does not exist: {}",
            workdir.display()
        )));
    }

    info!("Checking out {} in {}", revision, workdir.display());

    let mut fetch = Command::new("git");
    fetch.current_dir(workdir).args(["fetch", "--all", "--quiet"]);
    if let Err(e) = run_with_timeout(fetch, "git fetch", timeout).await {
        warn!("Continuing without fetch: {}", e);
    }

    let mut checkout = Command::new("git");
    checkout
        .current_dir(workdir)
        .args(["checkout", "--force", "--quiet", revision]);
    run_with_timeout(checkout, "git checkout", timeout).await?;

    info!("Checked out {}", revision);
    Ok(())
}
