//! Prometheus metrics for deployment observability

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

use crate::models::deployment::DeploymentStatus;

/// Install the global Prometheus recorder.
///
/// Returns `None` when a recorder is already installed; metrics calls are
/// no-ops in that case.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Record a deployment status transition.
pub fn record_status(status: DeploymentStatus) {
    counter!("keeper_deployment_transitions_total", "status" => status.as_str()).increment(1);
}

/// Record a finished rollback.
pub fn rollback_finished(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("keeper_rollbacks_total", "outcome" => outcome).increment(1);
}

/// Record a health probe outcome.
pub fn probe_finished(healthy: bool) {
    let outcome = if healthy { "healthy" } else { "unhealthy" };
    counter!("keeper_health_probes_total", "outcome" => outcome).increment(1);
}

/// Record a notification that could not be delivered or queued.
pub fn notification_failed(channel: &str) {
    counter!("keeper_notification_failures_total", "channel" => channel.to_string()).increment(1);
}

/// Record a failed write of the deployment history.
pub fn persistence_failed() {
    counter!("keeper_persistence_failures_total").increment(1);
}
