//! Notification fan-out
//!
//! Lifecycle events and alerts are queued for the notifier worker and never
//! awaited by the orchestration core.

use chrono::Utc;
use openapi_client::models::{LifecycleEvent, Notification, Severity};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::deployment::DeploymentRecord;
use crate::telemetry;

/// Best-effort broadcast of deployment lifecycle events
pub trait Notifier: Send + Sync {
    fn notify_deployment(&self, record: &DeploymentRecord, event: LifecycleEvent);

    fn notify_alert(&self, severity: Severity, title: &str, message: &str);
}

/// Queue-backed notifier feeding the notifier worker
pub struct NotificationHub {
    tx: mpsc::Sender<Notification>,
}

impl NotificationHub {
    /// Create a hub and the receiving end for the worker
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn enqueue(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!("Notification queue full, dropping: {}", n.to_text());
                telemetry::notification_failed("queue");
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                warn!("Notification worker stopped, dropping: {}", n.to_text());
                telemetry::notification_failed("queue");
            }
        }
    }
}

impl Notifier for NotificationHub {
    fn notify_deployment(&self, record: &DeploymentRecord, event: LifecycleEvent) {
        info!(
            deployment_id = %record.id,
            revision = %record.revision,
            event = event.as_str(),
            "deployment event"
        );
        self.enqueue(Notification::Deployment {
            event,
            deployment: record.summary(),
            timestamp: Utc::now(),
        });
    }

    fn notify_alert(&self, severity: Severity, title: &str, message: &str) {
        warn!(severity = severity.as_str(), "{}: {}", title, message);
        self.enqueue(Notification::Alert {
            severity,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}
