//! Artifact staging
//!
//! Brings a release archive onto a local disk and locates its extracted
//! directory. Both steps are skipped when their output already exists: a file
//! of the same name in the staging folder, and a directory named after the
//! archive stem next to it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::{partial_path, CopyProgress, File};

/// Extracts a release archive into a directory
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), DeployError>;
}

/// Extractor backed by the `unzip` binary
#[derive(Debug, Clone)]
pub struct UnzipExtractor {
    binary: String,
}

impl UnzipExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for UnzipExtractor {
    fn default() -> Self {
        Self::new("unzip")
    }
}

#[async_trait]
impl ArchiveExtractor for UnzipExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), DeployError> {
        debug!("Extracting {} into {}", archive.display(), dest.display());
        let output = Command::new(&self.binary)
            .arg("-q")
            .arg("-o")
            .arg(archive)
            .arg("-d")
            .arg(dest)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployError::ArtifactNotFound(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(DeployError::ArtifactNotFound(format!(
                "Could not extract {}: {}",
                archive.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Whether `path` lives on a network share or a configured network mount
pub fn is_network_path(path: &Path, network_prefixes: &[String]) -> bool {
    let text = path.to_string_lossy();
    if text.starts_with(r"\\") || text.starts_with("//") {
        return true;
    }
    network_prefixes.iter().any(|prefix| {
        !prefix.is_empty()
            && text.len() >= prefix.len()
            && text.is_char_boundary(prefix.len())
            && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    })
}

/// Stages release artifacts on local disk
pub struct ArtifactStager {
    staging_dir: Dir,
    network_prefixes: Vec<String>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl ArtifactStager {
    pub fn new(
        staging_dir: Dir,
        network_prefixes: Vec<String>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            staging_dir,
            network_prefixes,
            extractor,
        }
    }

    /// Stage `source` and return the extracted release root.
    pub async fn stage(
        &self,
        source: &Path,
        progress: &mut dyn CopyProgress,
    ) -> Result<PathBuf, DeployError> {
        let source_dir = Dir::new(source);
        if source_dir.exists().await {
            info!("Using release directory as is: {}", source.display());
            return Ok(source.to_path_buf());
        }

        let source_file = File::new(source);
        if !source_file.exists().await {
            return Err(DeployError::ArtifactNotFound(format!(
                "Could not find release archive: {}",
                source.display()
            )));
        }

        let archive = self.copy_local(&source_file, progress).await?;
        self.extract_or_reuse(&archive).await
    }

    /// Copy a network archive into the staging folder; local archives are returned unchanged.
    pub async fn copy_local(
        &self,
        source: &File,
        progress: &mut dyn CopyProgress,
    ) -> Result<PathBuf, DeployError> {
        if !is_network_path(source.path(), &self.network_prefixes) {
            return Ok(source.path().to_path_buf());
        }

        let file_name = source.path().file_name().ok_or_else(|| {
            DeployError::ArtifactNotFound(format!("Not a file path: {}", source.path().display()))
        })?;
        let dest = self.staging_dir.path().join(file_name);

        if File::new(&dest).exists().await {
            info!("Release archive already staged: {}", dest.display());
            return Ok(dest);
        }

        self.staging_dir.create().await?;
        info!(
            "Detected network drive as source, copying to local folder {}",
            self.staging_dir.path().display()
        );
        let copied = source.copy_with_progress(&dest, progress).await?;
        info!("Copied {} bytes to {}", copied, dest.display());
        Ok(dest)
    }

    async fn extract_or_reuse(&self, archive: &Path) -> Result<PathBuf, DeployError> {
        let stem = archive.file_stem().ok_or_else(|| {
            DeployError::ArtifactNotFound(format!("Not a file path: {}", archive.display()))
        })?;
        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        let target = Dir::new(parent.join(stem));

        if target.exists().await {
            info!("Reusing extracted release: {}", target.path().display());
            return Ok(target.path().to_path_buf());
        }

        // The target only appears once extraction completed
        let partial = Dir::new(partial_path(target.path()));
        if partial.exists().await {
            warn!("Removing unfinished extraction {}", partial.path().display());
            tokio::fs::remove_dir_all(partial.path()).await?;
        }

        info!("Extracting {}", archive.display());
        partial.create().await?;
        if let Err(e) = self.extractor.extract(archive, partial.path()).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(partial.path()).await {
                warn!("Could not remove {}: {}", partial.path().display(), cleanup);
            }
            return Err(e);
        }
        tokio::fs::rename(partial.path(), target.path()).await?;
        info!("Extraction completed: {}", target.path().display());
        Ok(target.path().to_path_buf())
    }
}
