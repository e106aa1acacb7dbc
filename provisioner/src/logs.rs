//! Logging configuration

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::DeployError;

/// Crates whose info output drowns the deployment phases
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "hyper=warn", "reqwest=warn"];

/// Verbosity of the deployment log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    #[value(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Filter directive for this level with dependency chatter held back
    pub fn directive(self) -> String {
        let mut directive = self.as_str().to_string();
        if matches!(self, LogLevel::Trace | LogLevel::Debug) {
            return directive;
        }
        for quiet in QUIET_DEPENDENCIES {
            directive.push(',');
            directive.push_str(quiet);
        }
        directive
    }
}

/// Logging options
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub log_level: LogLevel,

    /// Emit JSON lines instead of human readable output
    pub json_format: bool,
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(options: LogOptions) -> Result<(), DeployError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(options.log_level.directive()));

    let (plain, json) = if options.json_format {
        (None, Some(fmt::layer().json().with_target(false)))
    } else {
        (Some(fmt::layer().with_target(false)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| DeployError::ConfigError(e.to_string()))
}
