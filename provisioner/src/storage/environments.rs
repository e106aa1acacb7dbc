//! Registered environment store
//!
//! Instances are kept in a JSON document keyed by name, next to an optional
//! active environment pointer. Fields this crate does not know about are
//! preserved on every write.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::platform::RuntimeVariant;

/// Access coordinates of a provisioned instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredEnvironment {
    pub name: String,
    pub uri: String,
    pub login: String,
    pub password: String,
    pub runtime: RuntimeVariant,
}

/// Persisted record of one environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentRecord {
    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub is_net_core: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Whole environment store document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_environment_key: Option<String>,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentRecord>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Records newly provisioned instances
#[async_trait]
pub trait EnvironmentRegistrar: Send + Sync {
    /// Insert or update the environment named `environment.name`
    async fn register(&self, environment: &RegisteredEnvironment) -> Result<(), DeployError>;
}

/// JSON file backed environment store
pub struct EnvironmentStore {
    file: File,
    write_lock: Mutex<()>,
}

impl EnvironmentStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the document; a missing file is an empty store
    pub async fn load(&self) -> Result<EnvironmentsDocument, DeployError> {
        if !self.file.exists().await {
            return Ok(EnvironmentsDocument::default());
        }
        self.file.read_json().await
    }

    /// Look up one environment
    pub async fn get(&self, name: &str) -> Result<Option<EnvironmentRecord>, DeployError> {
        Ok(self.load().await?.environments.get(name).cloned())
    }

    /// Point the active environment at an existing entry
    pub async fn set_active(&self, name: &str) -> Result<(), DeployError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        if !document.environments.contains_key(name) {
            return Err(DeployError::RegistrationFailed(format!(
                "Not found environment {} in settings",
                name
            )));
        }
        document.active_environment_key = Some(name.to_string());
        self.file.write_json(&document).await?;
        info!("Active environment set to {}", name);
        Ok(())
    }
}

#[async_trait]
impl EnvironmentRegistrar for EnvironmentStore {
    async fn register(&self, environment: &RegisteredEnvironment) -> Result<(), DeployError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self
            .load()
            .await
            .map_err(|e| DeployError::RegistrationFailed(e.to_string()))?;

        let record = document
            .environments
            .entry(environment.name.clone())
            .or_default();
        record.uri = environment.uri.clone();
        record.login = environment.login.clone();
        record.password = environment.password.clone();
        record.is_net_core = !environment.runtime.is_framework();

        self.file
            .write_json(&document)
            .await
            .map_err(|e| DeployError::RegistrationFailed(e.to_string()))?;

        info!("Environment {} was configured...", environment.name);
        Ok(())
    }
}
