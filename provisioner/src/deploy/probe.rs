//! Readiness probe
//!
//! Polls the instance health endpoint until it answers with a success status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::storage::settings::ProbeSettings;

/// Health endpoint route
pub const PING_ROUTE: &str = "/api/HealthCheck/Ping";

/// Timeout of a single probe request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits for an instance to become ready
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Poll `uri` until it is ready. Returns the number of attempts made.
    async fn wait_until_ready(&self, uri: &str, cancel: &CancellationToken) -> Result<u32, DeployError>;
}

/// Probe timing
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self::from(&ProbeSettings::default())
    }
}

impl From<&ProbeSettings> for ProbeOptions {
    fn from(settings: &ProbeSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_attempts: settings.max_attempts.max(1),
        }
    }
}

/// HTTP health endpoint probe
pub struct HttpReadinessProbe {
    client: Client,
    options: ProbeOptions,
}

impl HttpReadinessProbe {
    pub fn new(options: ProbeOptions) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT.min(options.timeout))
            .build()?;
        Ok(Self { client, options })
    }

    async fn poll(&self, url: &str) -> Result<u32, DeployError> {
        for attempt in 1..=self.options.max_attempts {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(attempt),
                Ok(response) => debug!("Attempt {}: {} answered {}", attempt, url, response.status()),
                Err(e) => debug!("Attempt {}: {} unreachable: {}", attempt, url, e),
            }
            if attempt < self.options.max_attempts {
                tokio::time::sleep(self.options.interval).await;
            }
        }
        Err(DeployError::ReadinessTimeout(format!(
            "{} did not answer after {} attempts",
            url, self.options.max_attempts
        )))
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn wait_until_ready(&self, uri: &str, cancel: &CancellationToken) -> Result<u32, DeployError> {
        let url = format!("{}{}", uri.trim_end_matches('/'), PING_ROUTE);
        warn!("Waiting for application to start on: {}", uri);

        let attempts = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(DeployError::Cancelled(format!("Stopped waiting for {}", uri)));
            }
            result = tokio::time::timeout(self.options.timeout, self.poll(&url)) => match result {
                Ok(result) => result?,
                Err(_) => {
                    return Err(DeployError::ReadinessTimeout(format!(
                        "{} did not answer within {}s",
                        url,
                        self.options.timeout.as_secs()
                    )));
                }
            },
        };

        info!("Application answered on {} after {} attempts", uri, attempts);
        Ok(attempts)
    }
}
