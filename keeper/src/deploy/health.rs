//! Health probing of the deployed service
//!
//! A probe makes one bounded GET against the liveness endpoint. Classification,
//! in order:
//!
//! 1. transport failure or timeout: unhealthy
//! 2. non-2xx status: unhealthy
//! 3. body that is not a liveness document: unhealthy
//! 4. `status` other than `ok` / `healthy`: unhealthy
//! 5. otherwise healthy
//!
//! The advisory `database` field is only logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::{LifecycleEvent, LivenessResponse, Severity};
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::KeeperError;
use crate::models::deployment::DeploymentStatus;
use crate::notify::Notifier;
use crate::storage::records::RecordStore;
use crate::telemetry;

/// Single liveness probe against the deployed service
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self) -> Result<LivenessResponse, KeeperError>;
}

/// HTTP liveness probe with a hard timeout
pub struct HttpLivenessProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpLivenessProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, KeeperError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn probe(&self) -> Result<LivenessResponse, KeeperError> {
        debug!("GET {}", self.url);

        let request = async {
            let response = self.client.get(&self.url).send().await.map_err(|e| {
                KeeperError::ProbeUnhealthy(format!("request to {} failed: {}", self.url, e))
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(KeeperError::ProbeUnhealthy(format!(
                    "{} answered {}",
                    self.url, status
                )));
            }

            let body = response.bytes().await.map_err(|e| {
                KeeperError::ProbeUnhealthy(format!("reading body from {} failed: {}", self.url, e))
            })?;
            classify_body(&body)
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(KeeperError::ProbeTimeout(self.timeout)),
        }
    }
}

/// Parse a liveness body and check its status token
pub fn classify_body(body: &[u8]) -> Result<LivenessResponse, KeeperError> {
    let parsed: LivenessResponse = serde_json::from_slice(body)
        .map_err(|e| KeeperError::ProbeUnhealthy(format!("unparseable liveness body: {}", e)))?;

    if !parsed.is_ok() {
        return Err(KeeperError::ProbeUnhealthy(format!(
            "liveness status {:?}",
            parsed.status
        )));
    }
    Ok(parsed)
}

/// Validation polling options
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Delay between probes
    pub poll_interval: Duration,

    /// Longest time a release gets to become healthy
    pub window: Duration,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            window: Duration::from_secs(10),
        }
    }
}

/// Runs probes and records their outcome on deployment records
pub struct HealthProber {
    store: Arc<RecordStore>,
    probe: Arc<dyn LivenessProbe>,
    notifier: Arc<dyn Notifier>,
}

impl HealthProber {
    pub fn new(
        store: Arc<RecordStore>,
        probe: Arc<dyn LivenessProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            probe,
            notifier,
        }
    }

    /// Probe once and record `Success` or `Failed` on the deployment
    pub async fn check(&self, id: &str) -> Result<bool, KeeperError> {
        self.store.get(id).await?;

        let healthy = self.probe_once(id).await;
        self.commit(id, healthy).await;
        Ok(healthy)
    }

    /// Probe every `poll_interval` until healthy or until `window` runs out.
    ///
    /// Only the final outcome is recorded on the deployment.
    pub async fn await_healthy(
        &self,
        id: &str,
        options: &ValidationOptions,
    ) -> Result<bool, KeeperError> {
        self.store.get(id).await?;

        let deadline = Instant::now() + options.window;
        let mut attempt = 0u32;
        let healthy = loop {
            attempt += 1;
            if self.probe_once(id).await {
                break true;
            }
            if Instant::now() + options.poll_interval > deadline {
                break false;
            }
            tokio::time::sleep(options.poll_interval).await;
        };

        info!(
            "Validation of {} finished after {} probe(s): {}",
            id,
            attempt,
            if healthy { "healthy" } else { "unhealthy" }
        );
        self.commit(id, healthy).await;
        Ok(healthy)
    }

    async fn probe_once(&self, id: &str) -> bool {
        let healthy = match self.probe.probe().await {
            Ok(body) => {
                match body.database.as_deref() {
                    Some(database) => info!("Deployment {} healthy (database: {})", id, database),
                    None => info!("Deployment {} healthy", id),
                }
                true
            }
            Err(e) => {
                warn!("Deployment {} unhealthy: {}", id, e);
                false
            }
        };
        telemetry::probe_finished(healthy);
        healthy
    }

    async fn commit(&self, id: &str, healthy: bool) {
        let (status, event) = if healthy {
            (DeploymentStatus::Success, LifecycleEvent::Completed)
        } else {
            (DeploymentStatus::Failed, LifecycleEvent::Failed)
        };

        match self.store.update_status(id, status, Some(healthy)).await {
            Ok(record) => self.notifier.notify_deployment(&record, event),
            Err(KeeperError::PersistenceFailed(e)) => {
                error!("Health outcome for {} is not persisted: {}", id, e);
                if let Ok(record) = self.store.get(id).await {
                    self.notifier.notify_deployment(&record, event);
                }
                self.notifier.notify_alert(
                    Severity::Critical,
                    "Deployment history not persisted",
                    &format!("Recording {} for {} failed: {}", status, id, e),
                );
            }
            Err(e) => warn!("Could not record health outcome for {}: {}", id, e),
        }
    }
}
