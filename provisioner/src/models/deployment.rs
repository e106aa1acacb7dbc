//! Deployment request and result models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentState;
use crate::errors::DeployError;

/// Where the instance is hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTarget {
    /// Local web-server site managed by the site manager
    Site,

    /// Container on the local container engine
    Container,
}

/// How much of the release tree a host receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPolicy {
    /// Only the two runtime configuration files
    #[default]
    Minimal,

    /// The whole release tree
    Full,
}

impl std::str::FromStr for ContentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" | "0" => Ok(ContentPolicy::Minimal),
            "full" | "1" => Ok(ContentPolicy::Full),
            _ => Err(format!("Invalid content policy: {}", s)),
        }
    }
}

/// A request to provision one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Release archive or extracted release directory
    pub artifact_path: PathBuf,

    /// Instance name, used for the database, site and container
    pub instance_name: String,

    /// Host port serving HTTP
    pub primary_port: u16,

    /// Host port bound to the secondary container port
    pub secondary_port: u16,

    /// Deployment target
    pub target: DeploymentTarget,

    /// Content-visibility policy
    pub content_policy: ContentPolicy,
}

impl DeploymentRequest {
    /// Build a request whose secondary port follows the primary one
    pub fn new(
        artifact_path: impl Into<PathBuf>,
        instance_name: impl Into<String>,
        primary_port: u16,
        target: DeploymentTarget,
        content_policy: ContentPolicy,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            instance_name: instance_name.into(),
            primary_port,
            secondary_port: primary_port.saturating_add(1),
            target,
            content_policy,
        }
    }

    /// Override the secondary port
    pub fn with_secondary_port(mut self, port: u16) -> Self {
        self.secondary_port = port;
        self
    }

    /// Reject requests the pipeline cannot act on
    pub fn validate(&self) -> Result<(), DeployError> {
        let name = self.instance_name.trim();
        if name.is_empty() {
            return Err(DeployError::ValidationError(
                "Instance name cannot be empty".to_string(),
            ));
        }
        if name.contains(['/', '\\', ':']) {
            return Err(DeployError::ValidationError(format!(
                "Instance name contains a path separator: {}",
                name
            )));
        }
        if self.primary_port == 0 || self.secondary_port == 0 {
            return Err(DeployError::ValidationError(
                "Ports must be between 1 and 65535".to_string(),
            ));
        }
        if self.primary_port == self.secondary_port {
            return Err(DeployError::ValidationError(format!(
                "Primary and secondary ports must differ: {}",
                self.primary_port
            )));
        }
        Ok(())
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub succeeded: bool,

    /// Name of the phase that failed, if any
    pub failed_phase: Option<String>,

    pub description: String,

    /// State the pipeline stopped in
    pub final_state: DeploymentState,
}

impl DeploymentResult {
    pub fn ready(description: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            failed_phase: None,
            description: description.into(),
            final_state: DeploymentState::Ready,
        }
    }

    pub fn failed(phase: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            failed_phase: Some(phase.into()),
            description: description.into(),
            final_state: DeploymentState::Failed,
        }
    }

    /// Process exit code for this result
    pub fn exit_code(&self) -> i32 {
        if self.succeeded {
            0
        } else {
            1
        }
    }
}
