//! Configuration apply services
//!
//! Connection strings reach an instance either through the HTTP configuration
//! service or by rewriting `ConnectionStrings.config` in its content folder.

use std::path::Path;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::host::CONNECTION_STRINGS_FILE;
use crate::http::client::HttpClient;
use crate::http::handler::HandlerResponse;

/// Route of the configuration handler
pub const CONFIGURE_PATH: &str = "/api/connection-strings";

/// Connection entry holding the database string
pub const DB_ENTRY: &str = "db";

/// Connection entry holding the cache string
pub const CACHE_ENTRY: &str = "redis";

/// Configuration apply request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    pub folder_path: String,
    pub db_string: String,
    pub redis: String,
    pub is_net_framework: String,
}

/// Applies connection configuration to an instance
#[async_trait]
pub trait ConfigService: Send + Sync {
    async fn apply(&self, request: &ConfigRequest) -> Result<HandlerResponse, DeployError>;
}

/// Configuration service reached over HTTP
pub struct HttpConfigService {
    client: HttpClient,
}

impl HttpConfigService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigService for HttpConfigService {
    async fn apply(&self, request: &ConfigRequest) -> Result<HandlerResponse, DeployError> {
        self.client.post(CONFIGURE_PATH, request).await
    }
}

/// Rewrites `ConnectionStrings.config` in place
#[derive(Debug, Default)]
pub struct FileConfigService;

#[async_trait]
impl ConfigService for FileConfigService {
    async fn apply(&self, request: &ConfigRequest) -> Result<HandlerResponse, DeployError> {
        let file = File::new(Path::new(&request.folder_path).join(CONNECTION_STRINGS_FILE));
        if !file.exists().await {
            return Ok(HandlerResponse::failure(format!(
                "Could not find {}",
                file.path().display()
            )));
        }

        let contents = file.read_string().await?;
        let contents = match set_connection_string(&contents, DB_ENTRY, &request.db_string)
            .and_then(|c| set_connection_string(&c, CACHE_ENTRY, &request.redis))
        {
            Ok(contents) => contents,
            Err(description) => return Ok(HandlerResponse::failure(description)),
        };

        file.write_atomic(contents.as_bytes()).await?;
        info!("Updated {}", file.path().display());
        Ok(HandlerResponse::success(format!(
            "Connection strings updated in {}",
            file.path().display()
        )))
    }
}

/// Replace the `connectionString` attribute of the `<add name="...">` entry `name`
pub fn set_connection_string(document: &str, name: &str, value: &str) -> Result<String, String> {
    let name = regex::escape(name);
    let escaped = xml_escape(value);
    let patterns = [
        format!(r#"(<add\b[^>]*?\bname\s*=\s*"{}"[^>]*?\bconnectionString\s*=\s*")[^"]*(")"#, name),
        format!(r#"(<add\b[^>]*?\bconnectionString\s*=\s*")[^"]*("[^>]*?\bname\s*=\s*"{}")"#, name),
    ];

    for pattern in &patterns {
        let re = Regex::new(pattern).map_err(|e| e.to_string())?;
        if re.is_match(document) {
            let updated = re.replace(document, |caps: &Captures| {
                format!("{}{}{}", &caps[1], escaped, &caps[2])
            });
            return Ok(updated.into_owned());
        }
    }
    Err(format!("No connection string named {} in {}", name, CONNECTION_STRINGS_FILE))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
