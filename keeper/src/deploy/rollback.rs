//! Rollback to the last known-good release

use std::sync::Arc;

use openapi_client::models::{LifecycleEvent, Severity};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::deploy::deployer::{DeployRequest, Deployer, ROLLBACK_ACTOR};
use crate::deploy::fsm;
use crate::deploy::health::{HealthProber, ValidationOptions};
use crate::errors::KeeperError;
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};
use crate::notify::Notifier;
use crate::storage::records::RecordStore;
use crate::telemetry;

/// Restores the predecessor of a failing deployment and re-validates it
pub struct RollbackExecutor {
    store: Arc<RecordStore>,
    deployer: Arc<dyn Deployer>,
    prober: Arc<HealthProber>,
    notifier: Arc<dyn Notifier>,
    validation: ValidationOptions,
    // one rollback at a time, there is only one release slot
    in_progress: Mutex<()>,
}

impl RollbackExecutor {
    pub fn new(
        store: Arc<RecordStore>,
        deployer: Arc<dyn Deployer>,
        prober: Arc<HealthProber>,
        notifier: Arc<dyn Notifier>,
        validation: ValidationOptions,
    ) -> Self {
        Self {
            store,
            deployer,
            prober,
            notifier,
            validation,
            in_progress: Mutex::new(()),
        }
    }

    /// Resolve the record to roll back and the release to restore.
    ///
    /// Fails with `NotFound` for unknown ids and `PreconditionFailed` when
    /// there is no successful predecessor to go back to or the deployer is
    /// not configured.
    pub async fn precheck(
        &self,
        id: &str,
    ) -> Result<(DeploymentRecord, DeploymentRecord), KeeperError> {
        let record = self.store.get(id).await?;

        if !fsm::can_roll_back(record.status) {
            return Err(KeeperError::PreconditionFailed(format!(
                "deployment {} is already {}",
                id, record.status
            )));
        }

        let previous_id = record.previous_id.as_deref().ok_or_else(|| {
            KeeperError::PreconditionFailed(format!("deployment {} has no predecessor", id))
        })?;

        let predecessor = self.store.get(previous_id).await.map_err(|_| {
            KeeperError::PreconditionFailed(format!(
                "predecessor {} of {} is missing",
                previous_id, id
            ))
        })?;

        if predecessor.status != DeploymentStatus::Success {
            return Err(KeeperError::PreconditionFailed(format!(
                "predecessor {} is {}, not success",
                predecessor.id, predecessor.status
            )));
        }

        // nothing is marked rolled back unless the restore can actually run
        self.deployer.ready().map_err(|e| {
            KeeperError::PreconditionFailed(format!("cannot restore {}: {}", predecessor.id, e))
        })?;

        Ok((record, predecessor))
    }

    /// Wait until no rollback is running
    pub async fn wait_idle(&self) {
        let _guard = self.in_progress.lock().await;
    }

    /// Roll `id` back to its predecessor; `true` when the restored release
    /// passed validation.
    pub async fn rollback(&self, id: &str) -> bool {
        let _guard = self.in_progress.lock().await;

        let (record, predecessor) = match self.precheck(id).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Rollback of {} not possible: {}", id, e);
                return false;
            }
        };

        info!(
            "Rolling back {} ({}) to {} ({})",
            record.id, record.revision, predecessor.id, predecessor.revision
        );

        let healthy = match self.restore(&record, &predecessor).await {
            Ok(healthy) => {
                if !healthy {
                    self.notifier.notify_alert(
                        Severity::Critical,
                        "Rollback validation failed",
                        &format!(
                            "Restored revision {} did not become healthy after rolling back {}",
                            predecessor.revision, record.id
                        ),
                    );
                }
                healthy
            }
            Err(e) => {
                error!("Rollback of {} failed: {}", record.id, e);
                self.notifier.notify_alert(
                    Severity::Critical,
                    "Rollback failed",
                    &format!(
                        "Restoring {} for deployment {} failed: {}",
                        predecessor.revision, record.id, e
                    ),
                );
                false
            }
        };

        telemetry::rollback_finished(healthy);
        healthy
    }

    async fn restore(
        &self,
        record: &DeploymentRecord,
        predecessor: &DeploymentRecord,
    ) -> Result<bool, KeeperError> {
        let rolled_back = self
            .store
            .update_status(&record.id, DeploymentStatus::RolledBack, None)
            .await?;
        self.notifier
            .notify_deployment(&rolled_back, LifecycleEvent::RolledBack);

        self.deployer.checkout(&predecessor.revision).await?;
        self.deployer
            .deploy(&DeployRequest {
                revision: predecessor.revision.clone(),
                git_ref: predecessor.git_ref.clone(),
                initiated_by: ROLLBACK_ACTOR.to_string(),
            })
            .await?;

        let replacement = self
            .store
            .append(DeploymentRecord::new(
                &predecessor.revision,
                &predecessor.git_ref,
                ROLLBACK_ACTOR,
                DeploymentStatus::Deploying,
                Some(record.id.clone()),
            ))
            .await?;
        self.notifier
            .notify_deployment(&replacement, LifecycleEvent::Deploying);

        self.prober
            .await_healthy(&replacement.id, &self.validation)
            .await
            .inspect_err(|e| {
                error!(
                    "Rollback deployment {} is stuck in {}: {}",
                    replacement.id,
                    DeploymentStatus::Deploying,
                    e
                )
            })
    }
}
