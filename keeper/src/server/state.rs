//! Server state

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;

use crate::deploy::orchestrator::Orchestrator;

/// Inbound webhook gate
pub struct WebhookGate {
    /// Shared bearer secret; `None` disables the webhook
    pub secret: Option<SecretString>,

    /// Branches whose pushes start a deployment
    pub release_branches: Vec<String>,

    /// Drive accepted deployments through the deployer
    pub run_deployer: bool,
}

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub webhook: WebhookGate,
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        webhook: WebhookGate,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            orchestrator,
            webhook,
            metrics,
        }
    }
}
