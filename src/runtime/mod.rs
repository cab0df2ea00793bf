//! Container runtime capability consumed by the sidecar ensurer and delegator.
//!
//! The trait is the seam between lifecycle logic and Docker: production code
//! uses [`DockerRuntime`], tests use [`crate::testing::StubRuntime`].

pub mod detect;
pub mod docker;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::platform::{ContainerHandle, ImageCoordinates, PlatformVariant};

pub use detect::{DockerReport, DockerStatus, check_docker};
pub use docker::{DockerRuntime, connect_docker};

/// Label key carrying the application name of a service container.
pub const APP_LABEL: &str = "app";
/// Label key carrying the platform variant of a service container.
pub const OS_LABEL: &str = "os";

/// Errors from container runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Docker not available: {reason}")]
    DockerNotAvailable { reason: String },

    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed { name: String, reason: String },

    #[error("Failed to remove container '{name}': {reason}")]
    ContainerRemovalFailed { name: String, reason: String },

    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed { name: String, reason: String },

    #[error("Failed to list running containers: {reason}")]
    ContainerLookupFailed { reason: String },
}

/// Everything needed to start a sidecar container as a long-lived service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLaunch {
    pub image_id: String,
    pub container_name: String,
    /// Value of the [`APP_LABEL`] label.
    pub app_name: String,
    /// Value of the [`OS_LABEL`] label.
    pub variant: PlatformVariant,
    pub host_port: u16,
    pub container_port: u16,
}

/// Operations the lifecycle core needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull `image` and return the local image id.
    async fn pull_image(&self, image: &ImageCoordinates) -> Result<String, RuntimeError>;

    /// Force-remove the container called `name`, running or not.
    ///
    /// Returns whether a container was removed; an absent name is not an error.
    async fn remove_container(&self, name: &str) -> Result<bool, RuntimeError>;

    /// Create and start a container for `launch`.
    async fn start_container_as_service(
        &self,
        launch: &ServiceLaunch,
    ) -> Result<ContainerHandle, RuntimeError>;

    /// Find a running container labelled with `app_name` and `variant`.
    async fn running_container_by_app_name(
        &self,
        app_name: &str,
        variant: PlatformVariant,
    ) -> Result<Option<ContainerHandle>, RuntimeError>;

    /// Copy a host file into `dest_dir` inside the container.
    async fn copy_file_to_container(
        &self,
        container: &ContainerHandle,
        host_path: &Path,
        dest_dir: &str,
    ) -> std::io::Result<()>;
}
