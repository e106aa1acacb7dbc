//! Wiring of the production collaborators

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::context::DeploymentContext;
use crate::artifact::stager::{ArtifactStager, UnzipExtractor};
use crate::config::cache::RedisPartitions;
use crate::config::service::{ConfigService, FileConfigService, HttpConfigService};
use crate::config::ConnectionConfigurator;
use crate::database::mssql::MsSqlServer;
use crate::database::postgres::PostgresServer;
use crate::database::DatabaseProvisioner;
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::deploy::probe::{HttpReadinessProbe, ProbeOptions};
use crate::errors::DeployError;
use crate::filesys::file::CopyProgress;
use crate::host::docker::DockerCli;
use crate::host::site::HttpSiteManager;
use crate::host::HostProvisioner;
use crate::http::client::{HttpClient, DEFAULT_TIMEOUT};
use crate::models::deployment::{DeploymentRequest, DeploymentResult};
use crate::storage::environments::EnvironmentStore;
use crate::storage::settings::ConfigServiceMode;

/// Logs copy progress in ten percent steps
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: u64,
}

impl CopyProgress for LogProgress {
    fn report(&mut self, copied_bytes: u64, total_bytes: u64) {
        if total_bytes == 0 {
            return;
        }
        let decile = copied_bytes.saturating_mul(10) / total_bytes;
        if decile > self.last_decile {
            self.last_decile = decile;
            info!("Copied {}% ({} of {} bytes)", decile * 10, copied_bytes, total_bytes);
        }
    }
}

/// Build an orchestrator backed by the services named in the settings
pub fn build_orchestrator(ctx: &DeploymentContext) -> Result<DeploymentOrchestrator, DeployError> {
    let settings = &ctx.settings;
    let advertised_host = settings.advertised_host();

    let stager = ArtifactStager::new(
        ctx.staging_dir(),
        settings.network_mount_prefixes.clone(),
        Arc::new(UnzipExtractor::default()),
    );

    let mssql = &settings.mssql;
    let databases = DatabaseProvisioner::new(
        Arc::new(PostgresServer::new(
            settings.postgres.connection(),
            settings.postgres.restore_binary.clone(),
        )),
        Arc::new(MsSqlServer::new(
            mssql.connection(),
            mssql.sqlcmd_binary.clone(),
            mssql.backup_dir.clone(),
            mssql.server_backup_dir.clone().unwrap_or_else(|| mssql.backup_dir.clone()),
        )),
    );

    let hosts = HostProvisioner::new(
        Arc::new(DockerCli::new(settings.docker.binary.clone())),
        Arc::new(HttpSiteManager::new(HttpClient::new(
            &settings.site_manager.base_url,
            DEFAULT_TIMEOUT,
        )?)),
        ctx.site_root(),
        advertised_host.clone(),
    );

    let config_service: Arc<dyn ConfigService> = match settings.config_service.mode {
        ConfigServiceMode::File => Arc::new(FileConfigService),
        ConfigServiceMode::Http => Arc::new(HttpConfigService::new(HttpClient::new(
            &settings.config_service.service.base_url,
            DEFAULT_TIMEOUT,
        )?)),
    };
    let configurator = ConnectionConfigurator::new(
        Arc::new(RedisPartitions::new(settings.redis.connection())),
        config_service,
        advertised_host,
    );

    let registrar = Arc::new(EnvironmentStore::new(ctx.layout.environments_file()));
    let probe = Arc::new(HttpReadinessProbe::new(ProbeOptions::from(&settings.probe))?);

    Ok(DeploymentOrchestrator::new(
        stager,
        databases,
        hosts,
        configurator,
        registrar,
        probe,
    ))
}

/// Run one deployment with the production collaborators
pub async fn run(ctx: &DeploymentContext, request: DeploymentRequest) -> Result<DeploymentResult, DeployError> {
    info!(
        "Deploying {} as {} ({:?}, {:?})",
        request.artifact_path.display(),
        request.instance_name,
        request.target,
        request.content_policy
    );

    let orchestrator = build_orchestrator(ctx)?;
    let mut progress = LogProgress::default();
    let result = orchestrator.run(ctx, &request, &mut progress).await;

    if !result.succeeded {
        warn!(
            "Deployment of {} stopped in the {} phase",
            request.instance_name,
            result.failed_phase.as_deref().unwrap_or("unknown")
        );
    }
    Ok(result)
}
