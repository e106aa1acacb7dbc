//! Container engine driven through the docker CLI

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::image::write_build_context;
use super::{ContainerEngine, ContainerSpec};
use crate::errors::DeployError;

/// docker CLI wrapper
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a docker command and return its stdout
    async fn run(&self, args: &[String]) -> Result<String, DeployError> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| DeployError::HostProvisioningFailed(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(DeployError::HostProvisioningFailed(format!(
                "docker {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Arguments of `docker create` for `spec`
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}", port.host_port, port.container_port));
    }
    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(mount.to_string());
    }
    args.push("--restart".to_string());
    args.push(spec.restart_policy.clone());
    args.push(spec.image.clone());
    args
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn image_exists(&self, reference: &str) -> Result<bool, DeployError> {
        let stdout = self
            .run(&[
                "images".to_string(),
                "--filter".to_string(),
                format!("reference={}", reference),
                "-q".to_string(),
            ])
            .await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), DeployError> {
        let parent = context_dir.parent().unwrap_or_else(|| Path::new("."));
        let context_file = parent.join(format!(
            "{}.context.tar",
            context_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "release".to_string())
        ));
        write_build_context(context_dir, &context_file).await?;

        let result = self.stream_build(&context_file, tag).await;

        if let Err(e) = tokio::fs::remove_file(&context_file).await {
            warn!("Could not remove {}: {}", context_file.display(), e);
        }
        result
    }

    async fn container_exists(&self, name: &str) -> Result<bool, DeployError> {
        let stdout = self
            .run(&[
                "ps".to_string(),
                "-a".to_string(),
                "--filter".to_string(),
                format!("name=^/{}$", name),
                "-q".to_string(),
            ])
            .await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DeployError> {
        let stdout = self.run(&create_args(spec)).await?;
        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(DeployError::HostProvisioningFailed(format!(
                "docker create returned no id for {}",
                spec.name
            )));
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DeployError> {
        self.run(&["start".to_string(), id.to_string()]).await?;
        Ok(())
    }
}

impl DockerCli {
    /// Feed the tar at `context_file` to `docker build` and log its output
    async fn stream_build(&self, context_file: &Path, tag: &str) -> Result<(), DeployError> {
        let mut child = Command::new(&self.binary)
            .args(["build", "-t", tag, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::HostProvisioningFailed(format!("Failed to run docker build: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeployError::Internal("docker build stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeployError::Internal("docker build stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DeployError::Internal("docker build stderr unavailable".to_string()))?;

        let feed = async move {
            let mut context = tokio::fs::File::open(context_file).await?;
            tokio::io::copy(&mut context, &mut stdin).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        };
        let log = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                info!("[docker build] {}", line);
            }
            Ok::<(), std::io::Error>(())
        };
        let errors = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        };
        let (fed, logged, errors) = tokio::join!(feed, log, errors);

        let status = child.wait().await?;
        if !status.success() {
            let errors = errors.unwrap_or_default();
            return Err(DeployError::HostProvisioningFailed(format!(
                "Image build for {} failed: {}",
                tag,
                String::from_utf8_lossy(&errors).trim()
            )));
        }
        fed?;
        logged?;
        Ok(())
    }
}
