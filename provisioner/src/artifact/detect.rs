//! Platform detection from release contents

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::platform::{DatabaseEngine, RuntimeVariant};

/// Folder holding the database backup inside a release
pub const DB_FOLDER: &str = "db";

/// Present at the release root only for core-runtime builds
pub const CORE_RUNTIME_MARKER: &str = "Terrasoft.WebHost.dll";

/// Backup file extension for an engine
pub fn backup_extension(engine: DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::MsSql => "bak",
        DatabaseEngine::Postgres => "backup",
    }
}

/// Locate the backup file `engine` restores from
pub async fn backup_file(root: &Path, engine: DatabaseEngine) -> Result<PathBuf, DeployError> {
    Dir::new(root)
        .subdir(DB_FOLDER)
        .find_by_extension(backup_extension(engine))
        .await?
        .ok_or_else(|| {
            DeployError::UnsupportedEngine(format!(
                "No *.{} file under {}",
                backup_extension(engine),
                root.join(DB_FOLDER).display()
            ))
        })
}

/// Classify the database engine and runtime of an extracted release
pub async fn detect(root: &Path) -> Result<(DatabaseEngine, RuntimeVariant), DeployError> {
    let db_dir = Dir::new(root).subdir(DB_FOLDER);

    let engine = if db_dir.find_by_extension(backup_extension(DatabaseEngine::MsSql)).await?.is_some() {
        DatabaseEngine::MsSql
    } else if db_dir.find_by_extension(backup_extension(DatabaseEngine::Postgres)).await?.is_some() {
        DatabaseEngine::Postgres
    } else {
        return Err(DeployError::UnsupportedEngine(format!(
            "No recognizable database backup under {}",
            db_dir.path().display()
        )));
    };

    let runtime = if Dir::new(root).file(CORE_RUNTIME_MARKER).exists().await {
        RuntimeVariant::Core
    } else {
        RuntimeVariant::Framework
    };

    debug!("Detected {} on {:?} in {}", engine, runtime, root.display());
    Ok((engine, runtime))
}
