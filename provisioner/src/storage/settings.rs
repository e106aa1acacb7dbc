//! Settings file management

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::DeployError;
use crate::logs::LogLevel;
use crate::models::platform::{CacheConnection, EngineConnection};
use crate::storage::layout::StorageLayout;

/// Provisioner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Folder network archives are staged into. Defaults to `<base>/products`.
    #[serde(default)]
    pub products_folder: Option<String>,

    /// Root folder sites are created under. Defaults to `<base>/sites`.
    #[serde(default)]
    pub site_root: Option<String>,

    /// Path prefixes treated as network drives besides UNC paths
    #[serde(default)]
    pub network_mount_prefixes: Vec<String>,

    /// Host name containers use to reach the database and cache, and the
    /// host name written into registered URIs. Defaults to the machine host name.
    #[serde(default)]
    pub advertised_host: Option<String>,

    /// Credentials registered for new instances
    #[serde(default)]
    pub instance_credentials: CredentialSettings,

    /// PostgreSQL server
    #[serde(default = "default_postgres")]
    pub postgres: DatabaseServerSettings,

    /// SQL Server
    #[serde(default)]
    pub mssql: MsSqlSettings,

    /// Cache server
    #[serde(default)]
    pub redis: RedisSettings,

    /// Container engine
    #[serde(default)]
    pub docker: DockerSettings,

    /// External site manager
    #[serde(default)]
    pub site_manager: ServiceSettings,

    /// Configuration apply service
    #[serde(default)]
    pub config_service: ConfigServiceSettings,

    /// Readiness probe
    #[serde(default)]
    pub probe: ProbeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            products_folder: None,
            site_root: None,
            network_mount_prefixes: Vec::new(),
            advertised_host: None,
            instance_credentials: CredentialSettings::default(),
            postgres: default_postgres(),
            mssql: MsSqlSettings::default(),
            redis: RedisSettings::default(),
            docker: DockerSettings::default(),
            site_manager: ServiceSettings::default(),
            config_service: ConfigServiceSettings::default(),
            probe: ProbeSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(layout: &StorageLayout) -> Result<Self, DeployError> {
        let file = layout.settings_file();
        if !file.exists().await {
            info!("No settings file at {}, using defaults", file.path().display());
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Host name advertised to containers and written into registered URIs
    pub fn advertised_host(&self) -> String {
        self.advertised_host
            .clone()
            .filter(|h| !h.is_empty())
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// Login registered for new instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    #[serde(default = "default_login")]
    pub login: String,

    #[serde(default = "default_login")]
    pub password: String,
}

fn default_login() -> String {
    "Supervisor".to_string()
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            login: default_login(),
            password: default_login(),
        }
    }
}

/// Database server address and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseServerSettings {
    #[serde(default = "default_db_host")]
    pub host: String,

    pub port: u16,

    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Restore tool invoked for backups
    #[serde(default = "default_pg_restore")]
    pub restore_binary: String,
}

impl DatabaseServerSettings {
    pub fn connection(&self) -> EngineConnection {
        EngineConnection::new(&self.host, self.port, &self.username, &self.password)
    }
}

fn default_db_host() -> String {
    "127.0.0.1".to_string()
}

fn default_pg_restore() -> String {
    "pg_restore".to_string()
}

fn default_postgres() -> DatabaseServerSettings {
    DatabaseServerSettings {
        host: default_db_host(),
        port: 5432,
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        restore_binary: default_pg_restore(),
    }
}

/// SQL Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsSqlSettings {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_mssql_port")]
    pub port: u16,

    #[serde(default = "default_mssql_user")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Folder the server can read backups from, as seen by this machine
    #[serde(default = "default_mssql_backup_dir")]
    pub backup_dir: String,

    /// Same folder as seen by the server. Defaults to `backup_dir`.
    #[serde(default)]
    pub server_backup_dir: Option<String>,

    /// Command line client used to issue statements
    #[serde(default = "default_sqlcmd")]
    pub sqlcmd_binary: String,
}

impl MsSqlSettings {
    pub fn connection(&self) -> EngineConnection {
        EngineConnection::new(&self.host, self.port, &self.username, &self.password)
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_mssql_user() -> String {
    "sa".to_string()
}

fn default_mssql_backup_dir() -> String {
    "/var/opt/mssql/backup".to_string()
}

fn default_sqlcmd() -> String {
    "sqlcmd".to_string()
}

impl Default for MsSqlSettings {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_mssql_port(),
            username: default_mssql_user(),
            password: String::new(),
            backup_dir: default_mssql_backup_dir(),
            server_backup_dir: None,
            sqlcmd_binary: default_sqlcmd(),
        }
    }
}

/// Cache server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,
}

impl RedisSettings {
    pub fn connection(&self) -> CacheConnection {
        CacheConnection {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_redis_port(),
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSettings {
    #[serde(default = "default_docker_binary")]
    pub binary: String,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
        }
    }
}

/// HTTP service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_service_url")]
    pub base_url: String,
}

fn default_service_url() -> String {
    "http://127.0.0.1:19999".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: default_service_url(),
        }
    }
}

/// How configuration is applied to an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigServiceMode {
    /// Rewrite the configuration files in place
    #[default]
    File,

    /// Delegate to the HTTP configuration service
    Http,
}

/// Configuration apply service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigServiceSettings {
    #[serde(default)]
    pub mode: ConfigServiceMode,

    #[serde(default)]
    pub service: ServiceSettings,
}

/// Readiness probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Overall deadline in seconds
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Pause between attempts in seconds
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,

    /// Upper bound on attempts
    #[serde(default = "default_probe_attempts")]
    pub max_attempts: u32,
}

fn default_probe_timeout() -> u64 {
    300
}

fn default_probe_interval() -> u64 {
    5
}

fn default_probe_attempts() -> u32 {
    60
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            interval_secs: default_probe_interval(),
            max_attempts: default_probe_attempts(),
        }
    }
}
