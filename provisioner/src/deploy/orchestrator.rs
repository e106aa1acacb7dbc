//! Deployment orchestrator
//!
//! Drives one request through the fixed phase sequence. The first failure
//! stops the pipeline and is reported with the phase it happened in. Nothing
//! done by earlier phases is undone.

use std::sync::Arc;

use tracing::{error, info};

use crate::app::context::DeploymentContext;
use crate::artifact::detect::detect;
use crate::artifact::stager::ArtifactStager;
use crate::config::ConnectionConfigurator;
use crate::database::DatabaseProvisioner;
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentPhase};
use crate::deploy::probe::ReadinessProbe;
use crate::errors::DeployError;
use crate::filesys::file::CopyProgress;
use crate::host::HostProvisioner;
use crate::models::deployment::{DeploymentRequest, DeploymentResult, DeploymentTarget};
use crate::models::platform::{RuntimeVariant, StagedArtifact};
use crate::storage::environments::{EnvironmentRegistrar, RegisteredEnvironment};

type PhaseError = (DeploymentPhase, DeployError);

fn at(phase: DeploymentPhase) -> impl Fn(DeployError) -> PhaseError {
    move |e| (phase, e)
}

/// Runs deployments end to end
pub struct DeploymentOrchestrator {
    stager: ArtifactStager,
    databases: DatabaseProvisioner,
    hosts: HostProvisioner,
    configurator: ConnectionConfigurator,
    registrar: Arc<dyn EnvironmentRegistrar>,
    probe: Arc<dyn ReadinessProbe>,
}

impl DeploymentOrchestrator {
    pub fn new(
        stager: ArtifactStager,
        databases: DatabaseProvisioner,
        hosts: HostProvisioner,
        configurator: ConnectionConfigurator,
        registrar: Arc<dyn EnvironmentRegistrar>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            stager,
            databases,
            hosts,
            configurator,
            registrar,
            probe,
        }
    }

    /// Provision the instance described by `request`
    pub async fn run(
        &self,
        ctx: &DeploymentContext,
        request: &DeploymentRequest,
        progress: &mut dyn CopyProgress,
    ) -> DeploymentResult {
        let mut fsm = DeploymentFsm::new();
        match self.execute(ctx, request, progress, &mut fsm).await {
            Ok(description) => {
                info!("{}", description);
                DeploymentResult::ready(description)
            }
            Err((phase, e)) => {
                let description = e.to_string();
                if let Err(transition) = fsm.process(DeploymentEvent::Fail(phase, description.clone())) {
                    error!("Could not record failure: {}", transition);
                }
                error!("[{}] {}", phase, description);
                DeploymentResult::failed(phase.to_string(), description)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &DeploymentContext,
        request: &DeploymentRequest,
        progress: &mut dyn CopyProgress,
        fsm: &mut DeploymentFsm,
    ) -> Result<String, PhaseError> {
        // Stage
        checkpoint(ctx, DeploymentPhase::Stage)?;
        request.validate().map_err(at(DeploymentPhase::Stage))?;
        let root = self
            .stager
            .stage(&request.artifact_path, progress)
            .await
            .map_err(at(DeploymentPhase::Stage))?;
        info!("[Unzip completed] - {}", root.display());
        advance(fsm, DeploymentEvent::Staged, DeploymentPhase::Stage)?;

        // Detect
        checkpoint(ctx, DeploymentPhase::Detect)?;
        let (engine, runtime) = detect(&root).await.map_err(at(DeploymentPhase::Detect))?;
        let staged = StagedArtifact { root, engine, runtime };
        info!("Detected {} database and {:?} runtime", engine, runtime);
        advance(fsm, DeploymentEvent::PlatformDetected, DeploymentPhase::Detect)?;

        // Database
        checkpoint(ctx, DeploymentPhase::Database)?;
        let database = self
            .databases
            .provision(&staged, &request.instance_name)
            .await
            .map_err(at(DeploymentPhase::Database))?;
        advance(fsm, DeploymentEvent::DatabaseProvisioned, DeploymentPhase::Database)?;

        // Host
        checkpoint(ctx, DeploymentPhase::Host)?;
        let host = self
            .hosts
            .provision(&staged, request)
            .await
            .map_err(at(DeploymentPhase::Host))?;
        advance(fsm, DeploymentEvent::HostProvisioned, DeploymentPhase::Host)?;

        // Configure, then start so the first boot reads the final configuration
        checkpoint(ctx, DeploymentPhase::Configure)?;
        let cache = ctx.settings.redis.connection();
        let profile = self
            .configurator
            .configure(&host, &database, &cache, staged.runtime, request.target)
            .await
            .map_err(at(DeploymentPhase::Configure))?;
        info!("Using cache partition {}", profile.cache_partition);
        self.hosts
            .start(&host)
            .await
            .map_err(at(DeploymentPhase::Configure))?;
        advance(fsm, DeploymentEvent::ConnectionConfigured, DeploymentPhase::Configure)?;

        // Register
        checkpoint(ctx, DeploymentPhase::Register)?;
        let credentials = &ctx.settings.instance_credentials;
        let environment = RegisteredEnvironment {
            name: request.instance_name.clone(),
            uri: host.address.clone(),
            login: credentials.login.clone(),
            password: credentials.password.clone(),
            runtime: match request.target {
                DeploymentTarget::Container => RuntimeVariant::Core,
                DeploymentTarget::Site => staged.runtime,
            },
        };
        self.registrar
            .register(&environment)
            .await
            .map_err(at(DeploymentPhase::Register))?;
        advance(fsm, DeploymentEvent::Registered, DeploymentPhase::Register)?;

        // Probe
        checkpoint(ctx, DeploymentPhase::Probe)?;
        self.probe
            .wait_until_ready(&host.address, &ctx.cancel)
            .await
            .map_err(at(DeploymentPhase::Probe))?;
        advance(fsm, DeploymentEvent::Ready, DeploymentPhase::Probe)?;

        Ok(format!("Instance {} is ready at {}", request.instance_name, host.address))
    }
}

fn checkpoint(ctx: &DeploymentContext, phase: DeploymentPhase) -> Result<(), PhaseError> {
    if ctx.cancel.is_cancelled() {
        return Err((
            phase,
            DeployError::Cancelled(format!("stopped before the {} phase", phase)),
        ));
    }
    Ok(())
}

fn advance(fsm: &mut DeploymentFsm, event: DeploymentEvent, phase: DeploymentPhase) -> Result<(), PhaseError> {
    fsm.process(event).map_err(at(phase))
}
