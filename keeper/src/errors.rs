//! Error types for Release Keeper

use thiserror::Error;

/// Main error type for Release Keeper
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Deployment not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Health probe timed out after {0:?}")]
    ProbeTimeout(std::time::Duration),

    #[error("Health probe unhealthy: {0}")]
    ProbeUnhealthy(String),

    #[error("External action failed: {0}")]
    ExternalActionFailed(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for KeeperError {
    fn from(err: anyhow::Error) -> Self {
        KeeperError::Internal(err.to_string())
    }
}
