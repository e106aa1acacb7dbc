//! Platform and provisioned resource models

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::artifact::tag::ArtifactTag;

/// Relational engine the release ships a backup for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseEngine {
    Postgres,
    MsSql,
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseEngine::Postgres => write!(f, "PostgreSQL"),
            DatabaseEngine::MsSql => write!(f, "MSSQL"),
        }
    }
}

/// Runtime the web process needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeVariant {
    Framework,
    Core,
}

impl RuntimeVariant {
    pub fn is_framework(&self) -> bool {
        matches!(self, RuntimeVariant::Framework)
    }
}

/// Extracted release with its detected platform
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    pub root: PathBuf,
    pub engine: DatabaseEngine,
    pub runtime: RuntimeVariant,
}

impl StagedArtifact {
    /// Directory name of the extracted release
    pub fn dir_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Address and credentials of a database server
#[derive(Debug, Clone)]
pub struct EngineConnection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl EngineConnection {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Address of the shared cache server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConnection {
    pub host: String,
    pub port: u16,
}

/// Database created for one instance
#[derive(Debug, Clone)]
pub struct ProvisionedDatabase {
    pub instance_name: String,
    pub engine: DatabaseEngine,
    pub connection: EngineConnection,

    /// Template the database was cloned from, when the engine supports templates
    pub template_name: Option<String>,

    /// Whether this call performed a restore
    pub restored: bool,
}

/// Kind-specific host details
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKind {
    Site { site_name: String },
    Container { image_tag: ArtifactTag, container_id: String },
}

/// Running host for one instance
#[derive(Debug, Clone)]
pub struct ProvisionedHost {
    pub kind: HostKind,

    /// Base URI the application answers on
    pub address: String,

    /// Folder holding the runtime configuration the host reads
    pub content_root: PathBuf,
}

/// Connection strings written into the instance configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub db_connection: String,
    pub cache_connection: String,
    pub cache_partition: u32,
}
