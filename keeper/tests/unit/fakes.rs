//! Test doubles shared by the integration tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keeper::deploy::deployer::{DeployRequest, Deployer, ROLLBACK_ACTOR};
use keeper::deploy::health::{LivenessProbe, ValidationOptions};
use keeper::deploy::orchestrator::{Orchestrator, OrchestratorOptions};
use keeper::errors::KeeperError;
use keeper::filesys::dir::Dir;
use keeper::models::deployment::DeploymentRecord;
use keeper::notify::Notifier;
use keeper::storage::records::RecordStore;
use openapi_client::models::{LifecycleEvent, LivenessResponse, Severity};

#[derive(Default)]
pub struct FakeDeployer {
    pub checkouts: Mutex<Vec<String>>,
    pub deploys: Mutex<Vec<DeployRequest>>,
    pub fail_checkout: AtomicBool,
    pub fail_deploy: AtomicBool,
    pub unconfigured: AtomicBool,
    /// Probe that turns healthy once a rollback redeploys
    pub heals_on_rollback: Mutex<Option<Arc<StaticProbe>>>,
}

impl FakeDeployer {
    pub fn checkouts(&self) -> Vec<String> {
        self.checkouts.lock().unwrap().clone()
    }

    pub fn deploys(&self) -> Vec<DeployRequest> {
        self.deploys.lock().unwrap().clone()
    }

    pub fn heal_on_rollback(&self, probe: Arc<StaticProbe>) {
        *self.heals_on_rollback.lock().unwrap() = Some(probe);
    }
}

#[async_trait]
impl Deployer for FakeDeployer {
    async fn checkout(&self, revision: &str) -> Result<(), KeeperError> {
        self.checkouts.lock().unwrap().push(revision.to_string());
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(KeeperError::ExternalActionFailed("checkout refused".to_string()));
        }
        Ok(())
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<(), KeeperError> {
        self.deploys.lock().unwrap().push(request.clone());
        if self.fail_deploy.load(Ordering::SeqCst) {
            return Err(KeeperError::ExternalActionFailed("deploy exited with 1".to_string()));
        }
        if request.initiated_by == ROLLBACK_ACTOR {
            if let Some(probe) = self.heals_on_rollback.lock().unwrap().as_ref() {
                probe.set_healthy(true);
            }
        }
        Ok(())
    }

    fn ready(&self) -> Result<(), KeeperError> {
        if self.unconfigured.load(Ordering::SeqCst) {
            return Err(KeeperError::ExternalActionFailed(
                "No deploy command configured".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, LifecycleEvent)>>,
    pub alerts: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(String, LifecycleEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<(Severity, String)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn critical_alerts(&self) -> usize {
        self.alerts()
            .iter()
            .filter(|(severity, _)| *severity == Severity::Critical)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_deployment(&self, record: &DeploymentRecord, event: LifecycleEvent) {
        self.events.lock().unwrap().push((record.id.clone(), event));
    }

    fn notify_alert(&self, severity: Severity, title: &str, _message: &str) {
        self.alerts.lock().unwrap().push((severity, title.to_string()));
    }
}

/// Probe whose answer is switched by the test
pub struct StaticProbe {
    pub healthy: AtomicBool,
    pub calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn probe(&self) -> Result<LivenessResponse, KeeperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(LivenessResponse {
                status: "ok".to_string(),
                database: Some("connected".to_string()),
            })
        } else {
            Err(KeeperError::ProbeUnhealthy("503 Service Unavailable".to_string()))
        }
    }
}

pub fn fast_validation() -> ValidationOptions {
    ValidationOptions {
        poll_interval: Duration::from_millis(10),
        window: Duration::from_millis(60),
    }
}

pub async fn temp_store(prefix: &str) -> (Dir, Arc<RecordStore>) {
    let dir = Dir::create_temp_dir(prefix).await.unwrap();
    let store = Arc::new(RecordStore::open(dir.file("deployments.json")).await);
    (dir, store)
}

/// Orchestrator wired to fakes
pub struct Harness {
    pub dir: Dir,
    pub store: Arc<RecordStore>,
    pub probe: Arc<StaticProbe>,
    pub deployer: Arc<FakeDeployer>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub async fn new(auto_rollback: bool) -> Self {
        let (dir, store) = temp_store("keeper-harness").await;
        let probe = Arc::new(StaticProbe::new(true));
        let deployer = Arc::new(FakeDeployer::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            probe.clone(),
            deployer.clone(),
            notifier.clone(),
            OrchestratorOptions {
                auto_rollback,
                validation: fast_validation(),
                stuck_after: Duration::from_secs(900),
            },
        ));

        Self {
            dir,
            store,
            probe,
            deployer,
            notifier,
            orchestrator,
        }
    }

    /// Start a deployment of `revision` on main and confirm it healthy
    pub async fn release(&self, revision: &str) -> DeploymentRecord {
        self.probe.set_healthy(true);
        let record = self
            .orchestrator
            .start(revision, "refs/heads/main", "alice")
            .await
            .unwrap();
        assert!(self.orchestrator.health_check(&record.id).await.unwrap());
        self.store.get(&record.id).await.unwrap()
    }

    pub async fn cleanup(self) {
        let _ = self.dir.delete().await;
    }
}
