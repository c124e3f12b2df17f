//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use openapi_client::models::Notification;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::KeeperError;
use crate::server::serve::serve;
use crate::server::state::{ServerState, WebhookGate};
use crate::workers::notifier;

/// Run Release Keeper until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), KeeperError> {
    info!("Initializing Release Keeper...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(options, metrics, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start Release Keeper: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: AppOptions,
    metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), KeeperError> {
    let (app_state, notifications_rx) = AppState::init(&options).await?;
    let app_state = Arc::new(app_state);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_notifier_worker(
        options.notifier_worker.clone(),
        notifications_rx,
        shutdown_manager,
    )?;

    let stuck = app_state.orchestrator.report_stuck().await;
    if !stuck.is_empty() {
        info!("{} deployment(s) need operator attention", stuck.len());
    }

    init_socket_server(
        options,
        app_state,
        metrics,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await
}

fn init_notifier_worker(
    options: notifier::Options,
    notifications_rx: mpsc::Receiver<Notification>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), KeeperError> {
    info!("Initializing notifier worker...");

    // stopped separately so notifications from a finishing rollback still go out
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        notifier::run(
            &options,
            notifications_rx,
            Box::pin(async move {
                let _ = stop_rx.await;
            }),
        )
        .await;
    });

    shutdown_manager.with_notifier_worker(handle, stop_tx)
}

async fn init_socket_server(
    options: AppOptions,
    app_state: Arc<AppState>,
    metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), KeeperError> {
    info!("Initializing local HTTP server...");

    let gate = WebhookGate {
        secret: options.webhook.secret,
        release_branches: options.webhook.release_branches,
        run_deployer: options.enable_deployer,
    };
    if gate.secret.is_none() {
        info!("No webhook secret configured, deploy webhooks are disabled");
    }

    let server_state = ServerState::new(app_state.orchestrator.clone(), gate, metrics);

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    socket_server_handle: Option<JoinHandle<Result<(), KeeperError>>>,
    notifier_worker_handle: Option<JoinHandle<()>>,
    notifier_stop: Option<oneshot::Sender<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            socket_server_handle: None,
            notifier_worker_handle: None,
            notifier_stop: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), KeeperError> {
        if self.app_state.is_some() {
            return Err(KeeperError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_notifier_worker(
        &mut self,
        handle: JoinHandle<()>,
        stop: oneshot::Sender<()>,
    ) -> Result<(), KeeperError> {
        if self.notifier_worker_handle.is_some() {
            return Err(KeeperError::ShutdownError(
                "notifier_handle already set".to_string(),
            ));
        }
        self.notifier_worker_handle = Some(handle);
        self.notifier_stop = Some(stop);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), KeeperError>>,
    ) -> Result<(), KeeperError> {
        if self.socket_server_handle.is_some() {
            return Err(KeeperError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), KeeperError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), KeeperError> {
        info!("Shutting down Release Keeper...");

        // 1. Socket server, so no new work arrives
        if let Some(handle) = self.socket_server_handle.take() {
            handle
                .await
                .map_err(|e| KeeperError::ShutdownError(e.to_string()))??;
        }

        // 2. App state, which lets a running rollback finish
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        // 3. Notifier worker flushes what is queued
        if let Some(stop) = self.notifier_stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.notifier_worker_handle.take() {
            handle
                .await
                .map_err(|e| KeeperError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
