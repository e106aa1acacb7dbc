//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::DeployError;

/// Size of a single copy chunk
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Receives byte-level progress while a file is copied.
///
/// Called on the task driving the copy after every chunk, so implementations
/// must return quickly.
pub trait CopyProgress {
    fn report(&mut self, copied_bytes: u64, total_bytes: u64);
}

impl<F> CopyProgress for F
where
    F: FnMut(u64, u64),
{
    fn report(&mut self, copied_bytes: u64, total_bytes: u64) {
        self(copied_bytes, total_bytes)
    }
}

/// Progress sink that discards every report
pub struct NoProgress;

impl CopyProgress for NoProgress {
    fn report(&mut self, _copied_bytes: u64, _total_bytes: u64) {}
}

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, DeployError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, DeployError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write JSON through a temporary file so readers never see a partial document
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), DeployError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.write_atomic(contents.as_bytes()).await
    }

    /// Atomic write using a temporary file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), DeployError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Copy this file to `dest` in fixed-size chunks, reporting progress after each chunk.
    ///
    /// Bytes land in `<dest>.partial` first; `dest` only appears once the copy is complete.
    pub async fn copy_with_progress(
        &self,
        dest: &Path,
        progress: &mut dyn CopyProgress,
    ) -> Result<u64, DeployError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(dest);
        match self.copy_chunks(&partial, progress).await {
            Ok(copied) => {
                fs::rename(&partial, dest).await?;
                Ok(copied)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn copy_chunks(&self, dest: &Path, progress: &mut dyn CopyProgress) -> Result<u64, DeployError> {
        let mut source = fs::File::open(&self.path).await?;
        let total = source.metadata().await?.len();
        let mut target = fs::File::create(dest).await?;

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied: u64 = 0;
        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            target.write_all(&buffer[..read]).await?;
            copied += read as u64;
            progress.report(copied, total);
        }
        target.sync_all().await?;

        Ok(copied)
    }
}

/// Sibling path an unfinished `path` is written to
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
