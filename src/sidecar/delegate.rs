//! Staging artifacts into a ready sidecar and submitting work to it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::channel::{WorkChannel, WorkOutcome};
use crate::platform::ContainerHandle;
use crate::runtime::ContainerRuntime;
use crate::sidecar::ensurer::ReadySidecar;
use crate::sidecar::error::{InspectorError, Result};

/// One unit of work for a sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    /// Artifact on the host.
    pub host_path: PathBuf,
    /// Where the artifact sits once staged inside the sidecar.
    pub container_path: String,
    /// Logical name for the produced output.
    pub filename: String,
    /// Whether the sidecar deletes the artifact when done.
    pub cleanup: bool,
}

/// Directory part of a POSIX container path: `/a/b/f.tar` -> `/a/b`, `/f.tar` -> `/`.
pub fn container_parent_dir(container_path: &str) -> Option<&str> {
    match container_path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

/// Stages artifacts and submits work.
pub struct WorkDelegator {
    runtime: Arc<dyn ContainerRuntime>,
}

impl WorkDelegator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Stage the artifact, then submit. Submission is skipped if staging fails.
    pub async fn delegate(
        &self,
        ready: &ReadySidecar,
        channel: &dyn WorkChannel,
        request: &WorkRequest,
    ) -> Result<WorkOutcome> {
        self.stage(&request.host_path, &ready.container, &request.container_path)
            .await?;
        Self::submit(channel, request).await
    }

    /// Copy `host_path` into the directory that will hold `container_path`.
    pub async fn stage(
        &self,
        host_path: &Path,
        container: &ContainerHandle,
        container_path: &str,
    ) -> Result<()> {
        let staging_error = |dest_dir: &str, source: io::Error| InspectorError::Staging {
            host_path: host_path.to_path_buf(),
            container: container.clone(),
            dest_dir: dest_dir.to_string(),
            source,
        };

        let dest_dir = container_parent_dir(container_path).ok_or_else(|| {
            staging_error(
                container_path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("container path '{container_path}' has no parent directory"),
                ),
            )
        })?;

        let metadata = tokio::fs::metadata(host_path)
            .await
            .map_err(|e| staging_error(dest_dir, e))?;
        if !metadata.is_file() {
            return Err(staging_error(
                dest_dir,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        tracing::debug!(
            "Copying {} to {}:{}",
            host_path.display(),
            container,
            dest_dir
        );
        self.runtime
            .copy_file_to_container(container, host_path, dest_dir)
            .await
            .map_err(|e| staging_error(dest_dir, e))
    }

    /// Issue the work request. Redirects come back as [`WorkOutcome::Redirected`].
    pub async fn submit(channel: &dyn WorkChannel, request: &WorkRequest) -> Result<WorkOutcome> {
        tracing::debug!(
            container_path = %request.container_path,
            "Sending getBdio request to: {}",
            channel.base_url()
        );

        match channel
            .submit_work(&request.container_path, &request.filename, request.cleanup)
            .await
        {
            Ok(WorkOutcome::Redirected(signal)) => {
                tracing::debug!(
                    status = signal.status,
                    target = ?signal.target,
                    location = ?signal.location,
                    "Inspector redirected the request to another platform"
                );
                Ok(WorkOutcome::Redirected(signal))
            }
            Ok(completed) => Ok(completed),
            Err(e) => {
                tracing::debug!(
                    status = ?e.status,
                    message = %e.message,
                    "Work request failed"
                );
                Err(InspectorError::Transport(e))
            }
        }
    }
}
