//! Deploy actions
//!
//! Both webhook-triggered deploys and rollbacks go through the [`Deployer`]
//! trait, so there is one place that touches the working copy and restarts
//! the service.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::deploy::git;
use crate::deploy::process::run_with_timeout;
use crate::errors::KeeperError;

/// Actor recorded for system-initiated rollbacks
pub const ROLLBACK_ACTOR: &str = "system:rollback";

/// What to (re)deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub revision: String,
    pub git_ref: String,
    pub initiated_by: String,
}

/// Performs version-control checkout and the redeploy action
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Materialize `revision` in the working copy
    async fn checkout(&self, revision: &str) -> Result<(), KeeperError>;

    /// Build and restart the service for the checked out revision
    async fn deploy(&self, request: &DeployRequest) -> Result<(), KeeperError>;

    /// Whether checkout and deploy can run at all with the current configuration
    fn ready(&self) -> Result<(), KeeperError> {
        Ok(())
    }
}

/// Command deployer options
#[derive(Debug, Clone)]
pub struct CommandDeployerOptions {
    /// Git working copy of the deployed service
    pub workdir: PathBuf,

    /// Shell command that builds and restarts the service
    pub command: String,

    /// Bound on the deploy command
    pub deploy_timeout: Duration,

    /// Bound on each git invocation
    pub checkout_timeout: Duration,
}

impl Default for CommandDeployerOptions {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("/srv/app"),
            command: String::new(),
            deploy_timeout: Duration::from_secs(600),
            checkout_timeout: Duration::from_secs(120),
        }
    }
}

/// Deployer backed by git and a configured shell command.
///
/// The command receives `DEPLOY_REVISION`, `DEPLOY_REF` and `DEPLOY_ACTOR`
/// in its environment and runs inside the working copy.
pub struct CommandDeployer {
    options: CommandDeployerOptions,
}

impl CommandDeployer {
    pub fn new(options: CommandDeployerOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Deployer for CommandDeployer {
    async fn checkout(&self, revision: &str) -> Result<(), KeeperError> {
        git::checkout_revision(&self.options.workdir, revision, self.options.checkout_timeout)
            .await
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<(), KeeperError> {
        self.ready()?;

        info!(
            "Running deploy command for {} ({}) as {}",
            request.revision, request.git_ref, request.initiated_by
        );

        let mut command = Command::new("bash");
        command
            .current_dir(&self.options.workdir)
            .args(["-c", &self.options.command])
            .env("DEPLOY_REVISION", &request.revision)
            .env("DEPLOY_REF", &request.git_ref)
            .env("DEPLOY_ACTOR", &request.initiated_by);

        run_with_timeout(command, "deploy command", self.options.deploy_timeout).await?;

        info!("Deploy command finished for {}", request.revision);
        Ok(())
    }

    fn ready(&self) -> Result<(), KeeperError> {
        if self.options.command.trim().is_empty() {
            return Err(KeeperError::ExternalActionFailed(
                "No deploy command configured".to_string(),
            ));
        }
        if !self.options.workdir.is_dir() {
            return Err(KeeperError::ExternalActionFailed(format!(
                "Working copy {} does not exist",
                self.options.workdir.display()
            )));
        }
        Ok(())
    }
}
