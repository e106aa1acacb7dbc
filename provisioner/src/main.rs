//! Release instance provisioner - Entry Point
//!
//! Turns a release archive into a running, registered application instance
//! backed by a database clone and a cache partition.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use provisioner::app::context::DeploymentContext;
use provisioner::app::run::run;
use provisioner::logs::{init_logging, LogLevel, LogOptions};
use provisioner::models::deployment::{ContentPolicy, DeploymentRequest, DeploymentTarget};
use provisioner::storage::layout::{StorageLayout, HOME_ENV};
use provisioner::storage::settings::Settings;
use provisioner::utils::version_info;

#[derive(Parser)]
#[command(
    name = "provisioner",
    about = "Provision a runnable application instance from a release archive",
    version
)]
struct Cli {
    /// Base directory holding settings.json and environments.json
    #[arg(long, global = true, env = HOME_ENV)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a release as a new instance
    Deploy {
        /// Release archive or extracted release directory
        #[arg(long = "zip-file")]
        zip_file: PathBuf,

        /// Instance name used for the database, site and container
        #[arg(long)]
        name: String,

        /// Host port the instance serves HTTP on
        #[arg(long)]
        port: u16,

        /// Host port bound to the secondary container port (default: port + 1)
        #[arg(long = "secondary-port")]
        secondary_port: Option<u16>,

        /// Run the instance in a container instead of a site
        #[arg(long)]
        docker: bool,

        /// Content given to a container: minimal or full
        #[arg(long = "fs-content", default_value = "minimal")]
        fs_content: ContentPolicy,

        /// Override the configured log level
        #[arg(long = "log-level", value_enum, ignore_case = true)]
        log_level: Option<LogLevel>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            match serde_json::to_string_pretty(&version_info()) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to render version: {e}"),
            }
            ExitCode::SUCCESS
        }
        Commands::Deploy {
            zip_file,
            name,
            port,
            secondary_port,
            docker,
            fs_content,
            log_level,
        } => {
            let layout = cli.home.map(StorageLayout::new).unwrap_or_default();

            let settings = match Settings::load(&layout).await {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("Unable to read settings file: {e}");
                    return ExitCode::FAILURE;
                }
            };

            // Initialize logging
            let log_options = LogOptions {
                log_level: log_level.unwrap_or(settings.log_level),
                json_format: settings.json_logs,
            };
            if let Err(e) = init_logging(log_options) {
                println!("Failed to initialize logging: {e}");
            }

            let target = if docker {
                DeploymentTarget::Container
            } else {
                DeploymentTarget::Site
            };
            let mut request = DeploymentRequest::new(zip_file, name, port, target, fs_content);
            if let Some(secondary_port) = secondary_port {
                request = request.with_secondary_port(secondary_port);
            }

            let ctx = DeploymentContext::new(settings, layout);
            let cancel = ctx.cancel.clone();
            tokio::spawn(async move {
                await_shutdown_signal().await;
                cancel.cancel();
            });

            match run(&ctx, request).await {
                Ok(result) => {
                    info!("Deployment finished: {}", result.description);
                    ExitCode::from(result.exit_code() as u8)
                }
                Err(e) => {
                    error!("Failed to run the deployment: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            error!("Unable to listen for SIGTERM, only Ctrl+C cancels");
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, cancelling deployment...");
            } else {
                std::future::pending::<()>().await;
            }
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, cancelling deployment...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, cancelling deployment...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling deployment...");
        }
    }
}
