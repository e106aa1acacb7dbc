//! Deployment context

use tokio_util::sync::CancellationToken;

use crate::filesys::dir::Dir;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Settings and shared handles for one deployment run
#[derive(Debug, Clone)]
pub struct DeploymentContext {
    pub settings: Settings,
    pub layout: StorageLayout,

    /// Cancelled when the run should stop at the next phase boundary
    pub cancel: CancellationToken,
}

impl DeploymentContext {
    pub fn new(settings: Settings, layout: StorageLayout) -> Self {
        Self {
            settings,
            layout,
            cancel: CancellationToken::new(),
        }
    }

    /// Folder network archives are staged into
    pub fn staging_dir(&self) -> Dir {
        match &self.settings.products_folder {
            Some(folder) if !folder.is_empty() => Dir::new(folder),
            _ => self.layout.staging_dir(),
        }
    }

    /// Folder sites are created under
    pub fn site_root(&self) -> Dir {
        match &self.settings.site_root {
            Some(folder) if !folder.is_empty() => Dir::new(folder),
            _ => self.layout.sites_dir(),
        }
    }
}
