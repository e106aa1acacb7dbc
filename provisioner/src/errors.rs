//! Error types for the provisioner

use thiserror::Error;

/// Main error type for the provisioner
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Unsupported database engine: {0}")]
    UnsupportedEngine(String),

    #[error("Database provisioning failed: {0}")]
    DatabaseProvisioningFailed(String),

    #[error("Host naming conflict: {0}")]
    HostNamingConflict(String),

    #[error("Host provisioning failed: {0}")]
    HostProvisioningFailed(String),

    #[error("Configuration apply failed: {0}")]
    ConfigurationApplyFailed(String),

    #[error("No free cache partition on {0}")]
    NoFreeCachePartition(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Application did not become ready: {0}")]
    ReadinessTimeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Deployment cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}
