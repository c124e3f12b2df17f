//! Notification delivery worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::future::join_all;
use openapi_client::models::{ChatMessage, Notification};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::KeeperError;
use crate::storage::settings::{ChannelKind, NotificationChannel};
use crate::telemetry;

/// Notifier worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delivery targets
    pub channels: Vec<NotificationChannel>,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Queue capacity between the core and this worker
    pub queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            request_timeout: Duration::from_secs(5),
            queue_capacity: 256,
        }
    }
}

/// Run the notifier worker until shutdown or until every sender is gone
pub async fn run(
    options: &Options,
    mut rx: mpsc::Receiver<Notification>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!(
        "Notifier worker starting with {} channel(s)...",
        options.channels.len()
    );

    let client = match Client::builder().timeout(options.request_timeout).build() {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to build notification HTTP client: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                // Flush whatever was queued before shutdown
                while let Ok(notification) = rx.try_recv() {
                    deliver(&client, &options.channels, &notification).await;
                }
                info!("Notifier worker shutting down...");
                return;
            }
            received = rx.recv() => {
                match received {
                    Some(notification) => deliver(&client, &options.channels, &notification).await,
                    None => {
                        info!("Notification queue closed, notifier worker exiting...");
                        return;
                    }
                }
            }
        }
    }
}

/// Send one notification to every channel concurrently
pub async fn deliver(client: &Client, channels: &[NotificationChannel], notification: &Notification) {
    if channels.is_empty() {
        debug!("No notification channels configured: {}", notification.to_text());
        return;
    }

    let sends = channels.iter().map(|channel| async move {
        if let Err(e) = send(client, channel, notification).await {
            warn!("Notification to {} failed: {}", channel.name, e);
            telemetry::notification_failed(&channel.name);
        }
    });
    join_all(sends).await;
}

async fn send(
    client: &Client,
    channel: &NotificationChannel,
    notification: &Notification,
) -> Result<(), KeeperError> {
    let request = match channel.kind {
        ChannelKind::Webhook => client.post(&channel.url).json(notification),
        ChannelKind::Slack => client.post(&channel.url).json(&ChatMessage {
            text: notification.to_text(),
        }),
    };

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(KeeperError::ExternalActionFailed(format!(
            "{} answered {}",
            channel.url,
            response.status()
        )));
    }
    Ok(())
}
