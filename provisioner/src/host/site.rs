//! Site manager client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::http::handler::HandlerResponse;

/// Route of the site creation handler
pub const CREATE_SITE_PATH: &str = "/api/sites";

/// Site creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRequest {
    pub site_name: String,
    pub port: String,
    pub source_directory: String,
    pub destination_directory: String,
    pub is_net_framework: String,
}

/// Creates local web-server sites
#[async_trait]
pub trait SiteManager: Send + Sync {
    async fn create_site(&self, request: &SiteRequest) -> Result<HandlerResponse, DeployError>;
}

/// Site manager reached over HTTP
pub struct HttpSiteManager {
    client: HttpClient,
}

impl HttpSiteManager {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SiteManager for HttpSiteManager {
    async fn create_site(&self, request: &SiteRequest) -> Result<HandlerResponse, DeployError> {
        self.client.post(CREATE_SITE_PATH, request).await
    }
}
