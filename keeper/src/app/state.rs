//! Application state management

use std::sync::Arc;

use openapi_client::models::Notification;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::deployer::CommandDeployer;
use crate::deploy::health::HttpLivenessProbe;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::KeeperError;
use crate::notify::NotificationHub;
use crate::storage::records::RecordStore;

/// Main application state
pub struct AppState {
    /// Deployment history
    pub store: Arc<RecordStore>,

    /// Orchestration core
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Returns the receiving end of the notification queue for the notifier
    /// worker.
    pub async fn init(
        options: &AppOptions,
    ) -> Result<(Self, mpsc::Receiver<Notification>), KeeperError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let store = Arc::new(RecordStore::open(options.storage.history_file()).await);
        let probe = Arc::new(HttpLivenessProbe::new(
            &options.probe.url,
            options.probe.timeout,
        )?);
        let deployer = Arc::new(CommandDeployer::new(options.deployer.clone()));
        let (hub, notifications_rx) =
            NotificationHub::new(options.notifier_worker.queue_capacity);

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            probe,
            deployer,
            Arc::new(hub),
            options.orchestrator.clone(),
        ));

        Ok((
            Self {
                store,
                orchestrator,
            },
            notifications_rx,
        ))
    }

    /// Shutdown application state.
    ///
    /// Waits for a running rollback so the restored release is validated and
    /// recorded before the process exits.
    pub async fn shutdown(&self) -> Result<(), KeeperError> {
        info!("Waiting for a running rollback to finish...");
        self.orchestrator.wait_for_rollback().await;

        for record in self.store.list().await.iter().filter(|r| r.status.is_in_flight()) {
            warn!(
                "Deployment {} ({}) is still {} at shutdown",
                record.id, record.revision, record.status
            );
        }
        info!("Application state shut down");
        Ok(())
    }
}
