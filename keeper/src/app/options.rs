//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::deployer::CommandDeployerOptions;
use crate::deploy::health::ValidationOptions;
use crate::deploy::orchestrator::OrchestratorOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::notifier;

/// Main application options
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// Liveness probe configuration
    pub probe: ProbeOptions,

    /// Orchestration behavior
    pub orchestrator: OrchestratorOptions,

    /// Deploy action configuration
    pub deployer: CommandDeployerOptions,

    /// Run the deployer for webhook-started deployments
    pub enable_deployer: bool,

    /// Inbound webhook configuration
    pub webhook: WebhookOptions,

    /// Notifier worker options
    pub notifier_worker: notifier::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::default(),
            server: ServerOptions::default(),
            probe: ProbeOptions::default(),
            orchestrator: OrchestratorOptions::default(),
            deployer: CommandDeployerOptions::default(),
            enable_deployer: false,
            webhook: WebhookOptions::default(),
            notifier_worker: notifier::Options::default(),
        }
    }
}

impl AppOptions {
    /// Derive runtime options from the settings file
    pub fn from_settings(settings: &Settings, storage: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            probe: ProbeOptions {
                url: settings.health.url.clone(),
                timeout: Duration::from_secs(settings.health.timeout_secs),
            },
            orchestrator: OrchestratorOptions {
                auto_rollback: settings.rollback.auto_rollback,
                validation: ValidationOptions {
                    poll_interval: Duration::from_millis(settings.rollback.poll_interval_ms),
                    window: Duration::from_secs(settings.rollback.validation_window_secs),
                },
                stuck_after: Duration::from_secs(settings.stuck_after_secs),
            },
            deployer: CommandDeployerOptions {
                workdir: PathBuf::from(&settings.deployer.workdir),
                command: settings.deployer.command.clone(),
                deploy_timeout: Duration::from_secs(settings.deployer.timeout_secs),
                checkout_timeout: Duration::from_secs(settings.deployer.checkout_timeout_secs),
            },
            enable_deployer: settings.deployer.enabled,
            webhook: WebhookOptions {
                secret: settings.webhook.secret.clone().map(SecretString::from),
                release_branches: settings.webhook.release_branches.clone(),
            },
            notifier_worker: notifier::Options {
                channels: settings.notifications.channels.clone(),
                request_timeout: Duration::from_secs(settings.notifications.timeout_secs),
                queue_capacity: settings.notifications.queue_capacity,
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Liveness probe options
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub url: String,
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000/api/health".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Inbound webhook options
pub struct WebhookOptions {
    pub secret: Option<SecretString>,
    pub release_branches: Vec<String>,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self {
            secret: None,
            release_branches: vec!["main".to_string()],
        }
    }
}
