//! Finite State Machine for the deployment pipeline

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Nothing done yet
    Pending,

    /// Release extracted locally
    Staged,

    /// Database engine and runtime known
    PlatformDetected,

    /// Instance database exists
    DatabaseProvisioned,

    /// Site or container created
    HostProvisioned,

    /// Connection strings applied and host running
    ConnectionConfigured,

    /// Instance recorded in the environment store
    Registered,

    /// Instance answered its health endpoint
    Ready,

    /// A phase failed
    Failed,
}

impl DeploymentState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Ready | DeploymentState::Failed)
    }
}

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPhase {
    Stage,
    Detect,
    Database,
    Host,
    Configure,
    Register,
    Probe,
}

impl DeploymentPhase {
    /// State the pipeline is in while this phase runs
    pub fn source_state(&self) -> DeploymentState {
        match self {
            DeploymentPhase::Stage => DeploymentState::Pending,
            DeploymentPhase::Detect => DeploymentState::Staged,
            DeploymentPhase::Database => DeploymentState::PlatformDetected,
            DeploymentPhase::Host => DeploymentState::DatabaseProvisioned,
            DeploymentPhase::Configure => DeploymentState::HostProvisioned,
            DeploymentPhase::Register => DeploymentState::ConnectionConfigured,
            DeploymentPhase::Probe => DeploymentState::Registered,
        }
    }
}

impl std::fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeploymentPhase::Stage => "stage",
            DeploymentPhase::Detect => "detect",
            DeploymentPhase::Database => "database",
            DeploymentPhase::Host => "host",
            DeploymentPhase::Configure => "configure",
            DeploymentPhase::Register => "register",
            DeploymentPhase::Probe => "probe",
        };
        write!(f, "{}", name)
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Release staged
    Staged,

    /// Platform detected
    PlatformDetected,

    /// Database provisioned
    DatabaseProvisioned,

    /// Host created
    HostProvisioned,

    /// Configuration applied
    ConnectionConfigured,

    /// Environment registered
    Registered,

    /// Health endpoint answered
    Ready,

    /// A phase failed
    Fail(DeploymentPhase, String),
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
    failed_phase: Option<DeploymentPhase>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Pending,
            error: None,
            failed_phase: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Phase that failed, if any
    pub fn failed_phase(&self) -> Option<DeploymentPhase> {
        self.failed_phase
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), DeployError> {
        let new_state = match (&self.state, &event) {
            (DeploymentState::Pending, DeploymentEvent::Staged) => DeploymentState::Staged,
            (DeploymentState::Staged, DeploymentEvent::PlatformDetected) => DeploymentState::PlatformDetected,
            (DeploymentState::PlatformDetected, DeploymentEvent::DatabaseProvisioned) => {
                DeploymentState::DatabaseProvisioned
            }
            (DeploymentState::DatabaseProvisioned, DeploymentEvent::HostProvisioned) => {
                DeploymentState::HostProvisioned
            }
            (DeploymentState::HostProvisioned, DeploymentEvent::ConnectionConfigured) => {
                DeploymentState::ConnectionConfigured
            }
            (DeploymentState::ConnectionConfigured, DeploymentEvent::Registered) => DeploymentState::Registered,
            (DeploymentState::Registered, DeploymentEvent::Ready) => DeploymentState::Ready,

            // A phase may only fail while it is the one running
            (state, DeploymentEvent::Fail(phase, err)) if !state.is_terminal() && phase.source_state() == *state => {
                self.error = Some(err.clone());
                self.failed_phase = Some(*phase);
                DeploymentState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(DeployError::InvalidTransition(format!("{:?} -> {:?}", state, event)));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
