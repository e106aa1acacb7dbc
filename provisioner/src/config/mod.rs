//! Connection configuration
//!
//! Builds the database and cache connection strings an instance needs and
//! hands them to the configuration service for its content folder.

pub mod cache;
pub mod service;

use std::sync::Arc;

use tracing::info;

use crate::config::cache::{find_free_partition, PartitionInspector};
use crate::config::service::{ConfigRequest, ConfigService};
use crate::errors::DeployError;
use crate::http::handler::{flag, CompletionStatus};
use crate::models::deployment::DeploymentTarget;
use crate::models::platform::{
    CacheConnection, ConnectionProfile, DatabaseEngine, EngineConnection, ProvisionedDatabase, ProvisionedHost,
    RuntimeVariant,
};

/// Address sites use to reach local services
pub const LOOPBACK: &str = "127.0.0.1";

/// PostgreSQL connection string
pub fn postgres_connection_string(host: &str, connection: &EngineConnection, database: &str) -> String {
    format!(
        "Server={};Port={};Database={};User ID={};password={};Timeout=500; CommandTimeout=400;MaxPoolSize=1024;",
        host,
        connection.port,
        database,
        connection.username,
        connection.password()
    )
}

/// SQL Server connection string
pub fn mssql_connection_string(host: &str, connection: &EngineConnection, database: &str) -> String {
    format!(
        "Data Source={},{};Initial Catalog={};User Id={}; Password={};MultipleActiveResultSets=True;Pooling=true;Max Pool Size=100",
        host,
        connection.port,
        database,
        connection.username,
        connection.password()
    )
}

/// Cache connection string
pub fn cache_connection_string(host: &str, partition: u32, port: u16) -> String {
    format!("host={};db={};port={}", host, partition, port)
}

fn is_loopback(host: &str) -> bool {
    host == LOOPBACK || host.eq_ignore_ascii_case("localhost") || host == "::1"
}

/// Host an instance on `target` uses to reach a service configured at `configured`.
///
/// Remote services keep their address. Local ones are loopback for sites and
/// the advertised host name for containers.
pub fn service_host(configured: &str, target: DeploymentTarget, advertised_host: &str) -> String {
    if !is_loopback(configured) {
        return configured.to_string();
    }
    match target {
        DeploymentTarget::Site => LOOPBACK.to_string(),
        DeploymentTarget::Container => advertised_host.to_string(),
    }
}

/// Computes and applies the connection profile of an instance
pub struct ConnectionConfigurator {
    partitions: Arc<dyn PartitionInspector>,
    service: Arc<dyn ConfigService>,
    advertised_host: String,
}

impl ConnectionConfigurator {
    pub fn new(
        partitions: Arc<dyn PartitionInspector>,
        service: Arc<dyn ConfigService>,
        advertised_host: impl Into<String>,
    ) -> Self {
        Self {
            partitions,
            service,
            advertised_host: advertised_host.into(),
        }
    }

    /// Pick a cache partition, build the connection strings and apply them to `host`
    pub async fn configure(
        &self,
        host: &ProvisionedHost,
        database: &ProvisionedDatabase,
        cache: &CacheConnection,
        runtime: RuntimeVariant,
        target: DeploymentTarget,
    ) -> Result<ConnectionProfile, DeployError> {
        info!("[Update connection string] - Started");

        let cache_partition = find_free_partition(self.partitions.as_ref())
            .await?
            .ok_or_else(|| DeployError::NoFreeCachePartition(format!("{}:{}", cache.host, cache.port)))?;

        let db_host = service_host(&database.connection.host, target, &self.advertised_host);
        let db_connection = match database.engine {
            DatabaseEngine::Postgres => {
                postgres_connection_string(&db_host, &database.connection, &database.instance_name)
            }
            DatabaseEngine::MsSql => mssql_connection_string(&db_host, &database.connection, &database.instance_name),
        };

        let cache_host = service_host(&cache.host, target, &self.advertised_host);
        let cache_connection = cache_connection_string(&cache_host, cache_partition, cache.port);

        let is_net_framework = match target {
            DeploymentTarget::Container => false,
            DeploymentTarget::Site => runtime.is_framework(),
        };

        let request = ConfigRequest {
            folder_path: host.content_root.display().to_string(),
            db_string: db_connection.clone(),
            redis: cache_connection.clone(),
            is_net_framework: flag(is_net_framework),
        };

        let response = self
            .service
            .apply(&request)
            .await
            .map_err(|e| DeployError::ConfigurationApplyFailed(e.to_string()))?;
        match response.status {
            CompletionStatus::Success => info!("[Update connection string] - {}", response.description),
            CompletionStatus::Failure => return Err(DeployError::ConfigurationApplyFailed(response.description)),
        }

        Ok(ConnectionProfile {
            db_connection,
            cache_connection,
            cache_partition,
        })
    }
}
