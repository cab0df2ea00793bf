//! Guarantees a healthy sidecar for a platform variant, starting one if needed.
//!
//! ```text
//!   probe ──up──▶ resolve running container ──▶ Ready
//!     │
//!    down
//!     ▼
//!   resolve image ─▶ pull ─▶ replace ─▶ (pause, probe) × max_attempts ─▶ Ready
//!                                                 │
//!                                          never up ─▶ ProvisioningTimeout
//! ```
//!
//! Once provisioning begins exactly one container is started; there is no
//! re-check for a container started by someone else. Concurrent callers in the
//! same process are serialized per variant, so the second caller sees the
//! first caller's sidecar on its initial probe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::channel::WorkChannel;
use crate::platform::{ContainerHandle, ImageCoordinates, PlatformVariant, ServiceEndpoint};
use crate::runtime::{ContainerRuntime, ServiceLaunch};
use crate::sidecar::directory::InstanceDirectory;
use crate::sidecar::error::{InspectorError, Result};
use crate::sidecar::health::probe_health;

/// Application name carried by inspector sidecar containers.
pub const INSPECTOR_APP_NAME: &str = "hub-imageinspector-ws";

/// How long to wait for a freshly started sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Health probes after the container is started.
    pub max_attempts: u32,
    /// Pause before each of those probes.
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(10),
        }
    }
}

impl ReadinessPolicy {
    /// Worst-case time spent waiting after a start.
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// A pause that ended early.
#[derive(Debug, Error)]
#[error("pause interrupted: {0}")]
pub struct PauseInterrupted(pub String);

/// The suspension point between readiness probes.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration) -> std::result::Result<(), PauseInterrupted>;
}

/// [`Pause`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) -> std::result::Result<(), PauseInterrupted> {
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

/// A sidecar known to be healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySidecar {
    pub variant: PlatformVariant,
    pub endpoint: ServiceEndpoint,
    pub container: ContainerHandle,
    /// Whether this call started the container.
    pub provisioned: bool,
}

/// Drives probe, provision and wait for one variant at a time.
pub struct SidecarEnsurer {
    directory: Arc<InstanceDirectory>,
    runtime: Arc<dyn ContainerRuntime>,
    policy: ReadinessPolicy,
    pause: Arc<dyn Pause>,
    variant_locks: Mutex<HashMap<PlatformVariant, Arc<Mutex<()>>>>,
}

impl SidecarEnsurer {
    pub fn new(
        directory: Arc<InstanceDirectory>,
        runtime: Arc<dyn ContainerRuntime>,
        policy: ReadinessPolicy,
    ) -> Self {
        Self {
            directory,
            runtime,
            policy,
            pause: Arc::new(TokioPause),
            variant_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the pause between readiness probes.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    /// Ensure the sidecar for `variant`, reached through `channel`, is healthy.
    ///
    /// `channel` must point at `directory.endpoint(variant)`.
    pub async fn ensure_ready(
        &self,
        variant: PlatformVariant,
        channel: &dyn WorkChannel,
    ) -> Result<ReadySidecar> {
        let endpoint = self.directory.endpoint(variant);

        let lock = self.variant_lock(variant).await;
        let _guard = lock.lock().await;

        if probe_health(channel).await {
            let container = self.resolve_running(variant, &endpoint).await?;
            return Ok(ReadySidecar {
                variant,
                endpoint,
                container,
                provisioned: false,
            });
        }

        let (image, container) = self.provision(variant, &endpoint).await?;
        self.wait_for_ready(channel, &image, &endpoint).await?;

        tracing::info!("Image inspector {} ready at {}", image, endpoint);
        Ok(ReadySidecar {
            variant,
            endpoint,
            container,
            provisioned: true,
        })
    }

    async fn variant_lock(&self, variant: PlatformVariant) -> Arc<Mutex<()>> {
        let mut locks = self.variant_locks.lock().await;
        Arc::clone(locks.entry(variant).or_default())
    }

    /// Find the container behind a sidecar that already answered healthy.
    async fn resolve_running(
        &self,
        variant: PlatformVariant,
        endpoint: &ServiceEndpoint,
    ) -> Result<ContainerHandle> {
        match self
            .runtime
            .running_container_by_app_name(INSPECTOR_APP_NAME, variant)
            .await?
        {
            Some(container) => {
                tracing::debug!("Using running container {} for {}", container, variant);
                Ok(container)
            }
            None => {
                // Something answers on our port but we did not start it.
                tracing::warn!(
                    "Service {} is up but no running {} container for {} was found",
                    endpoint,
                    INSPECTOR_APP_NAME,
                    variant
                );
                Err(InspectorError::InstanceNotFound {
                    app_name: INSPECTOR_APP_NAME.to_string(),
                    variant,
                    endpoint: endpoint.clone(),
                })
            }
        }
    }

    /// Resolve, pull and start. Any failure aborts without retry.
    ///
    /// A container left under the same name by an earlier run is removed
    /// first, so a rerun after a crash or reboot does not hit a name conflict.
    async fn provision(
        &self,
        variant: PlatformVariant,
        endpoint: &ServiceEndpoint,
    ) -> Result<(ImageCoordinates, ContainerHandle)> {
        let image = self
            .directory
            .image_coordinates(variant)
            .await
            .map_err(|source| InspectorError::ConfigurationResolution { variant, source })?;

        tracing::debug!("Need to pull/run {}", image);
        let image_id = self.runtime.pull_image(&image).await?;

        let launch = ServiceLaunch {
            image_id,
            container_name: self.directory.container_name(&image),
            app_name: INSPECTOR_APP_NAME.to_string(),
            variant,
            host_port: endpoint.port,
            container_port: endpoint.container_port,
        };
        if self.runtime.remove_container(&launch.container_name).await? {
            tracing::info!(
                "Removed stale container {} before starting {}",
                launch.container_name,
                image
            );
        }
        let container = self.runtime.start_container_as_service(&launch).await?;
        tracing::info!(
            "Started container {} ({}) for {}",
            launch.container_name,
            container,
            variant
        );

        Ok((image, container))
    }

    async fn wait_for_ready(
        &self,
        channel: &dyn WorkChannel,
        image: &ImageCoordinates,
        endpoint: &ServiceEndpoint,
    ) -> Result<()> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            tracing::debug!(
                "Pausing {:?} to give service time to start up",
                self.policy.interval
            );
            if let Err(e) = self.pause.pause(self.policy.interval).await {
                tracing::error!(
                    "Interrupted while pausing so image inspector container based on image {} could start: {}",
                    image,
                    e
                );
            }

            tracing::debug!(
                attempt,
                max_attempts,
                "Checking service {} to see if it is up",
                endpoint
            );
            if probe_health(channel).await {
                return Ok(());
            }
        }

        Err(InspectorError::ProvisioningTimeout {
            image: image.clone(),
            endpoint: endpoint.clone(),
            attempts: max_attempts,
        })
    }
}
