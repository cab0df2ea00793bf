//! Error types for ensuring sidecars and delegating work to them.

use std::path::PathBuf;

use thiserror::Error;

use crate::channel::{ConnectError, TransportError};
use crate::platform::{ContainerHandle, ImageCoordinates, PlatformVariant, ServiceEndpoint};
use crate::runtime::RuntimeError;
use crate::sidecar::directory::DirectoryError;

/// Result type for sidecar operations.
pub type Result<T> = std::result::Result<T, InspectorError>;

/// Errors that can occur while ensuring a sidecar or delegating work to it.
#[derive(Debug, Error)]
pub enum InspectorError {
    /// Image coordinates could not be derived for the variant.
    #[error("Error getting image inspector container repo/tag for inspector OS {variant}: {source}")]
    ConfigurationResolution {
        variant: PlatformVariant,
        #[source]
        source: DirectoryError,
    },

    /// The channel to the sidecar could not be built.
    #[error("Error creating connection for URL: {url}, timeout: {timeout_secs}s: {source}")]
    ConnectionConstruction {
        url: String,
        timeout_secs: u64,
        #[source]
        source: ConnectError,
    },

    /// A freshly started sidecar never reported healthy.
    #[error(
        "Tried to start image inspector container {image}, but service {endpoint} never came online ({attempts} health checks)"
    )]
    ProvisioningTimeout {
        image: ImageCoordinates,
        endpoint: ServiceEndpoint,
        attempts: u32,
    },

    /// The artifact could not be copied into the container.
    #[error("Error copying file {} to {container}:{dest_dir}: {source}", host_path.display())]
    Staging {
        host_path: PathBuf,
        container: ContainerHandle,
        dest_dir: String,
        #[source]
        source: std::io::Error,
    },

    /// The work request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Pulling, starting or listing containers failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Health reported up but no matching container is running.
    #[error("Service {endpoint} reports healthy but no running '{app_name}' container for {variant} was found")]
    InstanceNotFound {
        app_name: String,
        variant: PlatformVariant,
        endpoint: ServiceEndpoint,
    },

    /// A pre-started sidecar did not answer its health check.
    #[error("Image inspector service at {url} is not healthy")]
    ServiceUnavailable { url: String },

    /// No inspector client supports this invocation.
    #[error("No image inspector client is applicable (enable service start or configure a service URL)")]
    NotApplicable,
}

impl InspectorError {
    /// HTTP status carried by a transport failure, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            InspectorError::Transport(e) => e.status,
            _ => None,
        }
    }
}
