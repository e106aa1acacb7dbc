//! Image build context
//!
//! The staged release is packed into an uncompressed tar that is streamed to
//! the engine as the build context. Database backups stay out of the image.

use std::fs;
use std::path::Path;

use tokio::task::spawn_blocking;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::DeployError;

/// Extensions left out of the build context
pub const EXCLUDED_EXTENSIONS: [&str; 2] = ["backup", "bak"];

/// Whether `path` is left out of the build context
pub fn is_excluded(path: &Path) -> bool {
    path.extension()
        .map(|ext| EXCLUDED_EXTENSIONS.iter().any(|x| ext.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Pack `src` into the tar file `dest`. Returns the number of files packed.
pub async fn write_build_context(src: &Path, dest: &Path) -> Result<u64, DeployError> {
    let src = src.to_owned();
    let dest = dest.to_owned();
    spawn_blocking(move || write_build_context_sync(&src, &dest))
        .await
        .map_err(|e| DeployError::Internal(format!("Build context task failed: {}", e)))?
}

fn write_build_context_sync(src: &Path, dest: &Path) -> Result<u64, DeployError> {
    let file = fs::File::create(dest)?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);

    let mut packed = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| DeployError::IoError(e.into()))?;
        let path = entry.path();
        if path == src {
            continue;
        }

        let relative = path
            .strip_prefix(src)
            .map_err(|e| DeployError::Internal(e.to_string()))?;

        if entry.file_type().is_dir() {
            builder.append_dir(relative, path)?;
        } else if entry.file_type().is_file() {
            if is_excluded(path) {
                debug!("Skipping {} in build context", relative.display());
                continue;
            }
            builder.append_path_with_name(path, relative)?;
            packed += 1;
        }
    }

    builder.into_inner()?;
    debug!("Packed {} files from {}", packed, src.display());
    Ok(packed)
}
