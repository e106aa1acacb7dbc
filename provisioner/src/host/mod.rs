//! Host provisioning
//!
//! An instance runs either as a site created by the site manager or as a
//! container on the local engine. Containers see the release through a
//! content folder next to the staged release, bound in whole or in part
//! depending on the content policy.

pub mod docker;
pub mod image;
pub mod site;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::artifact::tag::ArtifactTag;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::host::site::{SiteManager, SiteRequest};
use crate::http::handler::{flag, CompletionStatus};
use crate::models::deployment::{ContentPolicy, DeploymentRequest, DeploymentTarget};
use crate::models::platform::{HostKind, ProvisionedHost, StagedArtifact};

/// Connection string file read by the application
pub const CONNECTION_STRINGS_FILE: &str = "ConnectionStrings.config";

/// Runtime configuration of the core web host
pub const WEBHOST_CONFIG_FILE: &str = "Terrasoft.WebHost.dll.config";

/// Application folder inside the container
pub const CONTAINER_APP_DIR: &str = "/app/";

/// Container port serving HTTP
pub const PRIMARY_CONTAINER_PORT: &str = "5000/tcp";

/// Container port bound to the secondary host port
pub const SECONDARY_CONTAINER_PORT: &str = "5002/tcp";

/// Restart policy of created containers
pub const RESTART_POLICY: &str = "unless-stopped";

/// Host port published for a container port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: String,
    pub host_port: u16,
}

/// Host path mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
}

impl std::fmt::Display for BindMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

/// Everything needed to create one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortBinding>,
    pub mounts: Vec<BindMount>,
    pub restart_policy: String,
}

/// Container engine operations used by the provisioner
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether an image matches `reference`, which may use `*` as the tag
    async fn image_exists(&self, reference: &str) -> Result<bool, DeployError>;

    /// Build `tag` from the release tree at `context_dir`
    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), DeployError>;

    /// Whether a container named `name` exists, running or not
    async fn container_exists(&self, name: &str) -> Result<bool, DeployError>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DeployError>;

    /// Start a created container
    async fn start_container(&self, id: &str) -> Result<(), DeployError>;
}

/// Content folder prepared for a container instance
pub fn content_folder(staged_root: &Path, instance_name: &str) -> PathBuf {
    let parent = staged_root.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("Docker_{}", instance_name))
}

/// Populate `folder` from the release according to `policy` and return the mounts exposing it
pub async fn prepare_content(
    staged_root: &Path,
    folder: &Path,
    policy: ContentPolicy,
) -> Result<Vec<BindMount>, DeployError> {
    let folder_dir = Dir::new(folder);
    folder_dir.create().await?;

    match policy {
        ContentPolicy::Full => {
            let copied = Dir::new(staged_root).copy_to(folder).await?;
            info!("Copied {} files into {}", copied, folder.display());
            Ok(vec![BindMount {
                source: format!("{}/", folder.display()),
                target: CONTAINER_APP_DIR.to_string(),
            }])
        }
        ContentPolicy::Minimal => {
            let mut mounts = Vec::new();
            for name in [CONNECTION_STRINGS_FILE, WEBHOST_CONFIG_FILE] {
                let source = File::new(staged_root.join(name));
                if !source.exists().await {
                    return Err(DeployError::HostProvisioningFailed(format!(
                        "Release is missing {}",
                        source.path().display()
                    )));
                }
                let dest = folder_dir.file(name);
                tokio::fs::copy(source.path(), dest.path()).await?;
                mounts.push(BindMount {
                    source: dest.path().display().to_string(),
                    target: format!("{}{}", CONTAINER_APP_DIR, name),
                });
            }
            Ok(mounts)
        }
    }
}

/// Container creation parameters for an instance
pub fn container_spec(request: &DeploymentRequest, image: &str, mounts: Vec<BindMount>) -> ContainerSpec {
    ContainerSpec {
        name: request.instance_name.clone(),
        image: image.to_string(),
        ports: vec![
            PortBinding {
                container_port: PRIMARY_CONTAINER_PORT.to_string(),
                host_port: request.primary_port,
            },
            PortBinding {
                container_port: SECONDARY_CONTAINER_PORT.to_string(),
                host_port: request.secondary_port,
            },
        ],
        mounts,
        restart_policy: RESTART_POLICY.to_string(),
    }
}

/// Creates the host an instance runs on.
///
/// Containers are created stopped so that their configuration can be written
/// before the first start.
pub struct HostProvisioner {
    engine: Arc<dyn ContainerEngine>,
    sites: Arc<dyn SiteManager>,
    site_root: Dir,
    advertised_host: String,
}

impl HostProvisioner {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        sites: Arc<dyn SiteManager>,
        site_root: Dir,
        advertised_host: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            sites,
            site_root,
            advertised_host: advertised_host.into(),
        }
    }

    /// Base URI of an instance listening on `port`
    pub fn address(&self, port: u16) -> String {
        format!("http://{}:{}", self.advertised_host, port)
    }

    /// Create the host for `request` on its target
    pub async fn provision(
        &self,
        staged: &StagedArtifact,
        request: &DeploymentRequest,
    ) -> Result<ProvisionedHost, DeployError> {
        match request.target {
            DeploymentTarget::Container => self.provision_container(staged, request).await,
            DeploymentTarget::Site => self.provision_site(staged, request).await,
        }
    }

    /// Start a provisioned host. Sites are started by the site manager on creation.
    pub async fn start(&self, host: &ProvisionedHost) -> Result<(), DeployError> {
        match &host.kind {
            HostKind::Container { container_id, .. } => {
                self.engine.start_container(container_id).await?;
                info!("Container {} started", container_id);
                Ok(())
            }
            HostKind::Site { .. } => Ok(()),
        }
    }

    /// Make sure an image exists for the staged release and return its tag
    pub async fn ensure_image(&self, staged: &StagedArtifact) -> Result<ArtifactTag, DeployError> {
        let tag = ArtifactTag::from_path(&staged.root);
        if tag.short_name.is_empty() {
            return Err(DeployError::HostProvisioningFailed(format!(
                "No known product in release name {}",
                staged.dir_name()
            )));
        }

        let reference = tag.reference_filter();
        if self.engine.image_exists(&reference).await? {
            info!("Found existing image {}", reference);
            return Ok(tag);
        }

        let image = tag.image_tag().ok_or_else(|| {
            DeployError::HostProvisioningFailed(format!("Release {} has no version", staged.dir_name()))
        })?;
        info!("Building image {}", image);
        self.engine.build_image(&staged.root, &image).await?;
        info!("Image {} built", image);
        Ok(tag)
    }

    async fn provision_container(
        &self,
        staged: &StagedArtifact,
        request: &DeploymentRequest,
    ) -> Result<ProvisionedHost, DeployError> {
        let name = &request.instance_name;
        if self.engine.container_exists(name).await? {
            return Err(DeployError::HostNamingConflict(format!(
                "A container named {} already exists",
                name
            )));
        }

        let tag = self.ensure_image(staged).await?;
        let image = tag.reference_filter();

        let folder = content_folder(&staged.root, name);
        let mounts = prepare_content(&staged.root, &folder, request.content_policy).await?;

        let spec = container_spec(request, &image, mounts);
        let container_id = self.engine.create_container(&spec).await?;
        info!(
            "Container {} created from {} on ports {} and {}",
            name, image, request.primary_port, request.secondary_port
        );

        Ok(ProvisionedHost {
            kind: HostKind::Container {
                image_tag: tag,
                container_id,
            },
            address: self.address(request.primary_port),
            content_root: folder,
        })
    }

    async fn provision_site(
        &self,
        staged: &StagedArtifact,
        request: &DeploymentRequest,
    ) -> Result<ProvisionedHost, DeployError> {
        let name = &request.instance_name;
        let site_dir = self.site_root.subdir(name);
        if site_dir.exists().await {
            return Err(DeployError::HostNamingConflict(format!(
                "A site named {} already exists at {}",
                name,
                site_dir.path().display()
            )));
        }

        let site_request = SiteRequest {
            site_name: name.clone(),
            port: request.primary_port.to_string(),
            source_directory: staged.root.display().to_string(),
            destination_directory: self.site_root.path().display().to_string(),
            is_net_framework: flag(staged.runtime.is_framework()),
        };

        info!("[Create site] - Started");
        let response = self
            .sites
            .create_site(&site_request)
            .await
            .map_err(|e| DeployError::HostProvisioningFailed(e.to_string()))?;
        match response.status {
            CompletionStatus::Success => info!("[Create site] - {}", response.description),
            CompletionStatus::Failure => {
                return Err(DeployError::HostProvisioningFailed(response.description));
            }
        }

        Ok(ProvisionedHost {
            kind: HostKind::Site {
                site_name: name.clone(),
            },
            address: self.address(request.primary_port),
            content_root: site_dir.path().to_path_buf(),
        })
    }
}
