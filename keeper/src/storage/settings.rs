//! Settings file management

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::KeeperError;
use crate::logs::LogLevel;

/// Environment variable overriding the webhook secret
pub const WEBHOOK_SECRET_ENV: &str = "KEEPER_WEBHOOK_SECRET";

/// Environment variable overriding the liveness URL
pub const HEALTH_URL_ENV: &str = "KEEPER_HEALTH_URL";

/// Release Keeper settings
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Liveness probe configuration
    #[serde(default)]
    pub health: HealthSettings,

    /// Rollback validation configuration
    #[serde(default)]
    pub rollback: RollbackSettings,

    /// Deploy action configuration
    #[serde(default)]
    pub deployer: DeployerSettings,

    /// Inbound webhook configuration
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Notification channels
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Age after which a pending or deploying record is reported as stuck
    #[serde(default = "default_stuck_after")]
    pub stuck_after_secs: u64,
}

fn default_stuck_after() -> u64 {
    900
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            health: HealthSettings::default(),
            rollback: RollbackSettings::default(),
            deployer: DeployerSettings::default(),
            webhook: WebhookSettings::default(),
            notifications: NotificationSettings::default(),
            stuck_after_secs: default_stuck_after(),
        }
    }
}

impl Settings {
    /// Apply environment overrides on top of the file contents
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(WEBHOOK_SECRET_ENV) {
            if !secret.is_empty() {
                self.webhook.secret = Some(secret);
            }
        }
        if let Ok(url) = std::env::var(HEALTH_URL_ENV) {
            if !url.is_empty() {
                self.health.url = url;
            }
        }
    }

    /// Check values that would otherwise fail at first use
    pub fn validate(&self) -> Result<(), KeeperError> {
        Url::parse(&self.health.url).map_err(|e| {
            KeeperError::ConfigError(format!("Invalid health url {:?}: {}", self.health.url, e))
        })?;

        for channel in &self.notifications.channels {
            Url::parse(&channel.url).map_err(|e| {
                KeeperError::ConfigError(format!(
                    "Invalid url for notification channel {}: {}",
                    channel.name, e
                ))
            })?;
        }

        if self.health.timeout_secs == 0 {
            return Err(KeeperError::ConfigError(
                "health.timeout_secs must be positive".to_string(),
            ));
        }
        if self.deployer.command.trim().is_empty() {
            if self.deployer.enabled {
                return Err(KeeperError::ConfigError(
                    "deployer.command is required when the deployer is enabled".to_string(),
                ));
            }
            if self.rollback.auto_rollback {
                return Err(KeeperError::ConfigError(
                    "deployer.command is required when rollback.auto_rollback is set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Liveness probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Liveness endpoint of the deployed service
    #[serde(default = "default_health_url")]
    pub url: String,

    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

fn default_health_url() -> String {
    "http://127.0.0.1:3000/api/health".to_string()
}

fn default_health_timeout() -> u64 {
    10
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            url: default_health_url(),
            timeout_secs: default_health_timeout(),
        }
    }
}

/// Rollback validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSettings {
    /// Delay between validation probes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Longest time a redeployed release gets to become healthy
    #[serde(default = "default_validation_window")]
    pub validation_window_secs: u64,

    /// Roll back automatically when a health check fails; needs a deploy command
    #[serde(default)]
    pub auto_rollback: bool,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_validation_window() -> u64 {
    10
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            validation_window_secs: default_validation_window(),
            auto_rollback: false,
        }
    }
}

/// Deploy action settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerSettings {
    /// Run the deploy command for webhook-started deployments
    #[serde(default)]
    pub enabled: bool,

    /// Git working copy of the deployed service
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Shell command that builds and restarts the service
    #[serde(default)]
    pub command: String,

    #[serde(default = "default_deploy_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_checkout_timeout")]
    pub checkout_timeout_secs: u64,
}

fn default_workdir() -> String {
    "/srv/app".to_string()
}

fn default_deploy_timeout() -> u64 {
    600
}

fn default_checkout_timeout() -> u64 {
    120
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            workdir: default_workdir(),
            command: String::new(),
            timeout_secs: default_deploy_timeout(),
            checkout_timeout_secs: default_checkout_timeout(),
        }
    }
}

/// Inbound webhook settings
#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Shared bearer secret; webhooks answer 503 while unset
    #[serde(default)]
    pub secret: Option<String>,

    /// Branches whose pushes start a deployment
    #[serde(default = "default_release_branches")]
    pub release_branches: Vec<String>,
}

fn default_release_branches() -> Vec<String> {
    vec!["main".to_string()]
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            release_branches: default_release_branches(),
        }
    }
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,

    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_notification_timeout() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            timeout_secs: default_notification_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// One notification target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub name: String,

    #[serde(default)]
    pub kind: ChannelKind,

    pub url: String,
}

/// Wire format used for a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Structured JSON notification
    #[default]
    Webhook,

    /// `{"text": ...}` body for chat incoming webhooks
    Slack,
}
