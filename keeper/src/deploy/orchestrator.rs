//! Deployment orchestrator
//!
//! Façade over the record store, health prober and rollback executor. It
//! tracks state; the deploy action itself runs through the [`Deployer`] only
//! when [`Orchestrator::execute`] is used.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use openapi_client::models::{LifecycleEvent, Severity};
use tracing::{error, info, warn};

use crate::deploy::deployer::{DeployRequest, Deployer};
use crate::deploy::health::{HealthProber, LivenessProbe, ValidationOptions};
use crate::deploy::rollback::RollbackExecutor;
use crate::errors::KeeperError;
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};
use crate::notify::Notifier;
use crate::storage::records::RecordStore;

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Roll back automatically when a health check fails
    pub auto_rollback: bool,

    /// Polling used to validate deploys and rollbacks
    pub validation: ValidationOptions,

    /// Age after which in-flight records are reported as stuck
    pub stuck_after: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            auto_rollback: true,
            validation: ValidationOptions::default(),
            stuck_after: Duration::from_secs(900),
        }
    }
}

/// Deployment orchestrator
pub struct Orchestrator {
    store: Arc<RecordStore>,
    prober: Arc<HealthProber>,
    rollback: RollbackExecutor,
    deployer: Arc<dyn Deployer>,
    notifier: Arc<dyn Notifier>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        store: Arc<RecordStore>,
        probe: Arc<dyn LivenessProbe>,
        deployer: Arc<dyn Deployer>,
        notifier: Arc<dyn Notifier>,
        options: OrchestratorOptions,
    ) -> Self {
        let prober = Arc::new(HealthProber::new(
            store.clone(),
            probe,
            notifier.clone(),
        ));
        let rollback = RollbackExecutor::new(
            store.clone(),
            deployer.clone(),
            prober.clone(),
            notifier.clone(),
            options.validation.clone(),
        );

        Self {
            store,
            prober,
            rollback,
            deployer,
            notifier,
            options,
        }
    }

    pub fn auto_rollback(&self) -> bool {
        self.options.auto_rollback
    }

    /// Record a new `Pending` deployment on top of the current release
    pub async fn start(
        &self,
        revision: &str,
        git_ref: &str,
        initiated_by: &str,
    ) -> Result<DeploymentRecord, KeeperError> {
        let previous_id = self.store.current().await.ok().map(|r| r.id);
        let record = DeploymentRecord::new(
            revision,
            git_ref,
            initiated_by,
            DeploymentStatus::Pending,
            previous_id,
        );
        if record.revision.is_empty() {
            return Err(KeeperError::PreconditionFailed(
                "revision is required".to_string(),
            ));
        }

        let record = self.store.append(record).await?;
        info!(
            "Started deployment {} of {} ({}) for {}",
            record.id, record.revision, record.git_ref, record.initiated_by
        );
        self.notifier
            .notify_deployment(&record, LifecycleEvent::Started);
        Ok(record)
    }

    /// Probe the deployed service and record the outcome on `id`
    pub async fn health_check(&self, id: &str) -> Result<bool, KeeperError> {
        self.prober.check(id).await
    }

    /// Roll `id` back to its predecessor
    pub async fn rollback(&self, id: &str) -> bool {
        self.rollback.rollback(id).await
    }

    /// Let a running rollback finish; used before shutting down
    pub async fn wait_for_rollback(&self) {
        self.rollback.wait_idle().await
    }

    /// Check that `id` exists and has something to roll back to
    pub async fn rollback_precheck(&self, id: &str) -> Result<(), KeeperError> {
        self.rollback.precheck(id).await.map(|_| ())
    }

    pub async fn list_all(&self) -> Vec<DeploymentRecord> {
        self.store.list().await
    }

    pub async fn get(&self, id: &str) -> Result<DeploymentRecord, KeeperError> {
        self.store.get(id).await
    }

    pub async fn current(&self) -> Result<DeploymentRecord, KeeperError> {
        self.store.current().await
    }

    /// Deploy a pending record through the deployer, validate it and, when
    /// enabled, roll back on failure. Returns whether the release is healthy.
    pub async fn execute(&self, id: &str) -> Result<bool, KeeperError> {
        let record = self
            .store
            .update_status(id, DeploymentStatus::Deploying, None)
            .await?;
        self.notifier
            .notify_deployment(&record, LifecycleEvent::Deploying);

        let request = DeployRequest {
            revision: record.revision.clone(),
            git_ref: record.git_ref.clone(),
            initiated_by: record.initiated_by.clone(),
        };
        let action = async {
            self.deployer.checkout(&request.revision).await?;
            self.deployer.deploy(&request).await
        }
        .await;

        let healthy = match action {
            Ok(()) => {
                self.prober
                    .await_healthy(id, &self.options.validation)
                    .await?
            }
            Err(e) => {
                error!("Deploy action for {} failed: {}", id, e);
                let failed = self
                    .store
                    .update_status(id, DeploymentStatus::Failed, None)
                    .await?;
                self.notifier
                    .notify_deployment(&failed, LifecycleEvent::Failed);
                self.notifier.notify_alert(
                    Severity::Critical,
                    "Deploy action failed",
                    &format!("Deploying {} ({}) failed: {}", record.revision, id, e),
                );
                false
            }
        };

        if !healthy && self.options.auto_rollback {
            let restored = self.rollback(id).await;
            info!("Automatic rollback of {} finished, restored: {}", id, restored);
        }
        Ok(healthy)
    }

    /// Log and alert on records left pending or deploying for too long
    pub async fn report_stuck(&self) -> Vec<DeploymentRecord> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.options.stuck_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let stuck = self.store.stuck(cutoff).await;

        for record in &stuck {
            warn!(
                "Deployment {} ({}) stuck in {} since {}",
                record.id, record.revision, record.status, record.created_at
            );
            self.notifier.notify_alert(
                Severity::Warning,
                "Deployment stuck",
                &format!(
                    "Deployment {} of {} has been {} since {}",
                    record.id, record.revision, record.status, record.created_at
                ),
            );
        }
        stuck
    }
}
