//! Database provisioning
//!
//! PostgreSQL releases are restored once into a template database named after
//! the release directory; every instance is then a cheap clone of it. SQL
//! Server has no template tier and restores straight into the instance
//! database.

pub mod mssql;
pub mod postgres;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::artifact::detect::backup_file;
use crate::errors::DeployError;
use crate::models::platform::{DatabaseEngine, EngineConnection, ProvisionedDatabase, StagedArtifact};

/// Prefix of template database names
pub const TEMPLATE_PREFIX: &str = "template_";

/// Template database name for a release directory
pub fn template_name(artifact_dir_name: &str) -> String {
    format!("{}{}", TEMPLATE_PREFIX, artifact_dir_name)
}

/// Operations a database engine offers to the provisioner.
///
/// Duplicate-object errors are reported as success by implementations.
#[async_trait]
pub trait DatabaseServer: Send + Sync {
    /// Coordinates instances use to reach this server
    fn connection(&self) -> EngineConnection;

    /// Whether `name` exists; with `as_template` it must also be a template
    async fn check_exists(&self, name: &str, as_template: bool) -> Result<bool, DeployError>;

    /// Drop every session attached to `name`
    async fn terminate_connections(&self, name: &str) -> Result<(), DeployError>;

    /// Create an empty database
    async fn create(&self, name: &str) -> Result<(), DeployError>;

    /// Drop `name` if it exists
    async fn drop_database(&self, name: &str) -> Result<(), DeployError>;

    /// Restore `backup` into `name`
    async fn restore(&self, backup: &Path, name: &str) -> Result<(), DeployError>;

    /// Flag `name` as a template
    async fn mark_as_template(&self, name: &str) -> Result<(), DeployError>;

    /// Create `name` as a copy of `template`
    async fn clone_from_template(&self, template: &str, name: &str) -> Result<(), DeployError>;
}

/// Single-flight locks keyed by template name
#[derive(Default)]
pub struct TemplateLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TemplateLocks {
    /// Wait for exclusive use of `key` within this process
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Creates instance databases for staged releases
pub struct DatabaseProvisioner {
    postgres: Arc<dyn DatabaseServer>,
    mssql: Arc<dyn DatabaseServer>,
    template_locks: TemplateLocks,
}

impl DatabaseProvisioner {
    pub fn new(postgres: Arc<dyn DatabaseServer>, mssql: Arc<dyn DatabaseServer>) -> Self {
        Self {
            postgres,
            mssql,
            template_locks: TemplateLocks::default(),
        }
    }

    fn server(&self, engine: DatabaseEngine) -> &Arc<dyn DatabaseServer> {
        match engine {
            DatabaseEngine::Postgres => &self.postgres,
            DatabaseEngine::MsSql => &self.mssql,
        }
    }

    /// Create the database `instance_name` for `staged`
    pub async fn provision(
        &self,
        staged: &StagedArtifact,
        instance_name: &str,
    ) -> Result<ProvisionedDatabase, DeployError> {
        let server = self.server(staged.engine).clone();
        let backup = backup_file(&staged.root, staged.engine).await?;

        match staged.engine {
            DatabaseEngine::Postgres => {
                let template = template_name(&staged.dir_name());
                let restored = self.ensure_template(server.as_ref(), &template, &backup).await?;

                server.clone_from_template(&template, instance_name).await?;
                info!("[Database created] - {} from {}", instance_name, template);

                Ok(ProvisionedDatabase {
                    instance_name: instance_name.to_string(),
                    engine: staged.engine,
                    connection: server.connection(),
                    template_name: Some(template),
                    restored,
                })
            }
            DatabaseEngine::MsSql => {
                let restored = if server.check_exists(instance_name, false).await? {
                    warn!("Database {} already exists, skipping restore", instance_name);
                    false
                } else {
                    info!("[Starting Database restore] - {}", chrono::Local::now().format("%H:%M:%S"));
                    server.restore(&backup, instance_name).await?;
                    info!("[Completed Database restore] - {}", chrono::Local::now().format("%H:%M:%S"));
                    true
                };

                Ok(ProvisionedDatabase {
                    instance_name: instance_name.to_string(),
                    engine: staged.engine,
                    connection: server.connection(),
                    template_name: None,
                    restored,
                })
            }
        }
    }

    /// Make sure `template` exists and is a template. Returns whether a restore ran.
    async fn ensure_template(
        &self,
        server: &dyn DatabaseServer,
        template: &str,
        backup: &Path,
    ) -> Result<bool, DeployError> {
        let _guard = self.template_locks.acquire(template).await;

        if server.check_exists(template, true).await? {
            info!("Template {} exists, cloning", template);
            return Ok(false);
        }

        info!("[Starting Database restore] - {}", chrono::Local::now().format("%H:%M:%S"));
        server.terminate_connections(template).await?;
        if server.check_exists(template, false).await? {
            // Left behind by a restore that did not finish
            warn!("Database {} exists but is not a template, recreating it", template);
            server.drop_database(template).await?;
        }
        server.create(template).await?;
        server.restore(backup, template).await?;
        server.mark_as_template(template).await?;
        info!("[Completed Database restore] - {}", chrono::Local::now().format("%H:%M:%S"));
        Ok(true)
    }
}

/// Quote an identifier for PostgreSQL
pub(crate) fn quote_pg_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier for SQL Server
pub(crate) fn quote_mssql_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal for SQL Server
pub(crate) fn quote_mssql_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}
