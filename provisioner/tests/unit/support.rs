//! In-memory collaborators shared by the integration tests

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use provisioner::app::context::DeploymentContext;
use provisioner::artifact::stager::{ArchiveExtractor, ArtifactStager};
use provisioner::config::cache::PartitionInspector;
use provisioner::config::service::{ConfigRequest, ConfigService};
use provisioner::config::ConnectionConfigurator;
use provisioner::database::{DatabaseProvisioner, DatabaseServer};
use provisioner::deploy::orchestrator::DeploymentOrchestrator;
use provisioner::deploy::probe::ReadinessProbe;
use provisioner::errors::DeployError;
use provisioner::host::site::{SiteManager, SiteRequest};
use provisioner::host::{ContainerEngine, ContainerSpec, HostProvisioner};
use provisioner::http::handler::HandlerResponse;
use provisioner::models::platform::{DatabaseEngine, EngineConnection};
use provisioner::storage::environments::EnvironmentStore;
use provisioner::storage::layout::StorageLayout;
use provisioner::storage::settings::Settings;

pub const ADVERTISED_HOST: &str = "build-01";

/// Database server keeping its catalog in memory
pub struct FakeDatabaseServer {
    engine: DatabaseEngine,
    port: u16,
    /// name -> is template
    databases: Mutex<HashMap<String, bool>>,
    /// Databases holding objects from an unfinished restore
    half_restored: Mutex<HashSet<String>>,
    restores: AtomicUsize,
    clones: AtomicUsize,
    drops: AtomicUsize,
    /// Restores still to fail before one succeeds
    failing_restores: AtomicUsize,
}

impl FakeDatabaseServer {
    pub fn new(engine: DatabaseEngine, port: u16) -> Self {
        Self {
            engine,
            port,
            databases: Mutex::new(HashMap::new()),
            half_restored: Mutex::new(HashSet::new()),
            restores: AtomicUsize::new(0),
            clones: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
            failing_restores: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` restores fail half way
    pub fn fail_restores(self, count: usize) -> Self {
        self.failing_restores.store(count, Ordering::SeqCst);
        self
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    pub fn clones(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn is_template(&self, name: &str) -> bool {
        self.databases.lock().unwrap().get(name).copied().unwrap_or(false)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.databases.lock().unwrap().contains_key(name)
    }
}

#[async_trait]
impl DatabaseServer for FakeDatabaseServer {
    fn connection(&self) -> EngineConnection {
        let user = match self.engine {
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::MsSql => "sa",
        };
        EngineConnection::new("127.0.0.1", self.port, user, "pw")
    }

    async fn check_exists(&self, name: &str, as_template: bool) -> Result<bool, DeployError> {
        let databases = self.databases.lock().unwrap();
        Ok(databases
            .get(name)
            .map(|is_template| !as_template || *is_template)
            .unwrap_or(false))
    }

    async fn terminate_connections(&self, _name: &str) -> Result<(), DeployError> {
        Ok(())
    }

    async fn create(&self, name: &str) -> Result<(), DeployError> {
        self.databases.lock().unwrap().entry(name.to_string()).or_insert(false);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), DeployError> {
        self.half_restored.lock().unwrap().remove(name);
        if self.databases.lock().unwrap().remove(name).is_some() {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn restore(&self, backup: &Path, name: &str) -> Result<(), DeployError> {
        assert!(backup.is_file(), "backup {} should exist", backup.display());
        let failing = self
            .failing_restores
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.half_restored.lock().unwrap().contains(name) {
            return Err(DeployError::DatabaseProvisioningFailed(format!(
                "pg_restore: error: relation already exists in {}",
                name
            )));
        }
        if failing {
            self.databases.lock().unwrap().insert(name.to_string(), false);
            self.half_restored.lock().unwrap().insert(name.to_string());
            return Err(DeployError::DatabaseProvisioningFailed(format!(
                "pg_restore: error: could not execute query into {}",
                name
            )));
        }
        // Long enough for a concurrent provisioner to reach its existence check
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.restores.fetch_add(1, Ordering::SeqCst);
        self.databases.lock().unwrap().entry(name.to_string()).or_insert(false);
        Ok(())
    }

    async fn mark_as_template(&self, name: &str) -> Result<(), DeployError> {
        match self.databases.lock().unwrap().get_mut(name) {
            Some(is_template) => {
                *is_template = true;
                Ok(())
            }
            None => Err(DeployError::DatabaseProvisioningFailed(format!("[3D000] - {} does not exist", name))),
        }
    }

    async fn clone_from_template(&self, template: &str, name: &str) -> Result<(), DeployError> {
        let mut databases = self.databases.lock().unwrap();
        if !databases.get(template).copied().unwrap_or(false) {
            return Err(DeployError::DatabaseProvisioningFailed(format!(
                "[3D000] - template {} does not exist",
                template
            )));
        }
        self.clones.fetch_add(1, Ordering::SeqCst);
        databases.entry(name.to_string()).or_insert(false);
        Ok(())
    }
}

/// Container created on the fake engine
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
}

/// Container engine keeping images and containers in memory
#[derive(Default)]
pub struct FakeEngine {
    images: Mutex<Vec<String>>,
    containers: Mutex<Vec<FakeContainer>>,
    builds: AtomicUsize,
}

impl FakeEngine {
    pub fn with_container(name: &str) -> Self {
        let engine = Self::default();
        engine.containers.lock().unwrap().push(FakeContainer {
            id: format!("existing-{}", name),
            spec: ContainerSpec {
                name: name.to_string(),
                image: "other:1.0.0.0".to_string(),
                ports: Vec::new(),
                mounts: Vec::new(),
                restart_policy: "no".to_string(),
            },
            running: true,
        });
        engine
    }

    pub fn images(&self) -> Vec<String> {
        self.images.lock().unwrap().clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.containers.lock().unwrap().clone()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, reference: &str) -> Result<bool, DeployError> {
        let images = self.images.lock().unwrap();
        Ok(match reference.strip_suffix('*') {
            Some(prefix) => images.iter().any(|i| i.starts_with(prefix)),
            None => images.iter().any(|i| i == reference),
        })
    }

    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), DeployError> {
        assert!(context_dir.is_dir());
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().push(tag.to_string());
        Ok(())
    }

    async fn container_exists(&self, name: &str) -> Result<bool, DeployError> {
        Ok(self.containers.lock().unwrap().iter().any(|c| c.spec.name == name))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DeployError> {
        let id = format!("id-{}", spec.name);
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.clone(),
            spec: spec.clone(),
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DeployError> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DeployError::HostProvisioningFailed(format!("No such container: {}", id)))?;
        container.running = true;
        Ok(())
    }
}

/// Site manager recording its requests
#[derive(Default)]
pub struct FakeSites {
    requests: Mutex<Vec<SiteRequest>>,
}

impl FakeSites {
    pub fn requests(&self) -> Vec<SiteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteManager for FakeSites {
    async fn create_site(&self, request: &SiteRequest) -> Result<HandlerResponse, DeployError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(HandlerResponse::success(format!("Site {} created", request.site_name)))
    }
}

/// Configuration service recording its requests
pub struct FakeConfig {
    response: HandlerResponse,
    requests: Mutex<Vec<ConfigRequest>>,
}

impl FakeConfig {
    pub fn new(response: HandlerResponse) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConfigRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self::new(HandlerResponse::success("Connection strings updated"))
    }
}

#[async_trait]
impl ConfigService for FakeConfig {
    async fn apply(&self, request: &ConfigRequest) -> Result<HandlerResponse, DeployError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.response.clone())
    }
}

/// Cache server with fixed key counts per partition
pub struct FixedPartitions(pub Vec<u64>);

#[async_trait]
impl PartitionInspector for FixedPartitions {
    async fn partition_count(&self) -> Result<u32, DeployError> {
        Ok(self.0.len() as u32)
    }

    async fn key_count(&self, partition: u32) -> Result<u64, DeployError> {
        Ok(self.0[partition as usize])
    }
}

/// Probe answering immediately
#[derive(Default)]
pub struct FakeProbe {
    failure: Option<String>,
    uris: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            uris: Mutex::new(Vec::new()),
        }
    }

    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadinessProbe for FakeProbe {
    async fn wait_until_ready(&self, uri: &str, _cancel: &CancellationToken) -> Result<u32, DeployError> {
        self.uris.lock().unwrap().push(uri.to_string());
        match &self.failure {
            Some(message) => Err(DeployError::ReadinessTimeout(message.clone())),
            None => Ok(1),
        }
    }
}

/// Extractor that must never be reached
pub struct NoExtraction;

#[async_trait]
impl ArchiveExtractor for NoExtraction {
    async fn extract(&self, archive: &Path, _dest: &Path) -> Result<(), DeployError> {
        panic!("unexpected extraction of {}", archive.display());
    }
}

/// Write a release tree named `name` under `parent`
pub fn write_release(parent: &Path, name: &str, backup: &str, core: bool) -> PathBuf {
    let root = parent.join(name);
    std::fs::create_dir_all(root.join("db")).unwrap();
    std::fs::create_dir_all(root.join("bin")).unwrap();
    std::fs::write(root.join("db").join(backup), "backup").unwrap();
    std::fs::write(root.join("bin").join("app.dll"), "dll").unwrap();
    std::fs::write(
        root.join("ConnectionStrings.config"),
        r#"<connectionStrings><add name="db" connectionString="" /><add name="redis" connectionString="" /></connectionStrings>"#,
    )
    .unwrap();
    std::fs::write(root.join("Terrasoft.WebHost.dll.config"), "<configuration/>").unwrap();
    if core {
        std::fs::write(root.join("Terrasoft.WebHost.dll"), "dll").unwrap();
    }
    root
}

/// Fakes wired into an orchestrator over a temporary workspace
pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub ctx: DeploymentContext,
    pub postgres: Arc<FakeDatabaseServer>,
    pub mssql: Arc<FakeDatabaseServer>,
    pub engine: Arc<FakeEngine>,
    pub sites: Arc<FakeSites>,
    pub config: Arc<FakeConfig>,
    pub probe: Arc<FakeProbe>,
    pub partitions: Vec<u64>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeEngine::default(), FakeConfig::default(), FakeProbe::default(), vec![5, 4, 0, 0])
    }

    pub fn with(engine: FakeEngine, config: FakeConfig, probe: FakeProbe, partitions: Vec<u64>) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings {
            advertised_host: Some(ADVERTISED_HOST.to_string()),
            site_root: Some(tmp.path().join("sites").display().to_string()),
            ..Default::default()
        };
        let ctx = DeploymentContext::new(settings, StorageLayout::new(tmp.path().join("home")));

        Self {
            tmp,
            ctx,
            postgres: Arc::new(FakeDatabaseServer::new(DatabaseEngine::Postgres, 5432)),
            mssql: Arc::new(FakeDatabaseServer::new(DatabaseEngine::MsSql, 1433)),
            engine: Arc::new(engine),
            sites: Arc::new(FakeSites::default()),
            config: Arc::new(config),
            probe: Arc::new(probe),
            partitions,
        }
    }

    /// Folder releases are placed in
    pub fn products(&self) -> PathBuf {
        self.tmp.path().join("products")
    }

    pub fn store(&self) -> EnvironmentStore {
        EnvironmentStore::new(self.ctx.layout.environments_file())
    }

    pub fn orchestrator(&self) -> DeploymentOrchestrator {
        let stager = ArtifactStager::new(self.ctx.staging_dir(), Vec::new(), Arc::new(NoExtraction));
        let databases = DatabaseProvisioner::new(self.postgres.clone(), self.mssql.clone());
        let hosts = HostProvisioner::new(
            self.engine.clone(),
            self.sites.clone(),
            self.ctx.site_root(),
            ADVERTISED_HOST,
        );
        let configurator = ConnectionConfigurator::new(
            Arc::new(FixedPartitions(self.partitions.clone())),
            self.config.clone(),
            ADVERTISED_HOST,
        );

        DeploymentOrchestrator::new(
            stager,
            databases,
            hosts,
            configurator,
            Arc::new(self.store()),
            self.probe.clone(),
        )
    }
}
