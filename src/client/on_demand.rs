//! Strategy that starts inspector containers as needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{ChannelConnector, WorkChannel, WorkOutcome};
use crate::client::{InspectorClient, InvocationContext};
use crate::config::InspectorConfig;
use crate::platform::PlatformVariant;
use crate::runtime::ContainerRuntime;
use crate::sidecar::{
    InspectorError, InstanceDirectory, Pause, ReadinessPolicy, Result, SidecarEnsurer,
    WorkDelegator, WorkRequest,
};

/// Tunables for [`OnDemandClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnDemandSettings {
    /// Platform tried first.
    pub variant: PlatformVariant,
    pub request_timeout: Duration,
    pub readiness: ReadinessPolicy,
    /// Re-dispatch once to the platform a redirect names.
    pub follow_redirect: bool,
}

impl From<&InspectorConfig> for OnDemandSettings {
    fn from(config: &InspectorConfig) -> Self {
        Self {
            variant: config.default_os,
            request_timeout: config.request_timeout(),
            readiness: config.readiness_policy(),
            follow_redirect: config.follow_redirect,
        }
    }
}

/// Ensures the platform's sidecar is up (starting it if needed), stages the
/// artifact into it and submits the work.
pub struct OnDemandClient {
    directory: Arc<InstanceDirectory>,
    connector: Arc<dyn ChannelConnector>,
    ensurer: SidecarEnsurer,
    delegator: WorkDelegator,
    settings: OnDemandSettings,
}

impl OnDemandClient {
    pub fn new(
        directory: Arc<InstanceDirectory>,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn ChannelConnector>,
        settings: OnDemandSettings,
    ) -> Self {
        Self {
            ensurer: SidecarEnsurer::new(
                Arc::clone(&directory),
                Arc::clone(&runtime),
                settings.readiness,
            ),
            delegator: WorkDelegator::new(runtime),
            directory,
            connector,
            settings,
        }
    }

    /// Replace the pause between readiness probes.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.ensurer = self.ensurer.with_pause(pause);
        self
    }

    fn connect(&self, variant: PlatformVariant) -> Result<Arc<dyn WorkChannel>> {
        let url = self.directory.endpoint(variant).http_url();
        tracing::info!("ImageInspector URL: {}", url);
        let timeout = self.settings.request_timeout;
        self.connector
            .connect(&url, timeout)
            .map_err(|source| InspectorError::ConnectionConstruction {
                url,
                timeout_secs: timeout.as_secs(),
                source,
            })
    }

    async fn dispatch(
        &self,
        variant: PlatformVariant,
        request: &WorkRequest,
    ) -> Result<WorkOutcome> {
        let channel = self.connect(variant)?;
        let ready = self.ensurer.ensure_ready(variant, channel.as_ref()).await?;
        self.delegator
            .delegate(&ready, channel.as_ref(), request)
            .await
    }
}

#[async_trait]
impl InspectorClient for OnDemandClient {
    fn name(&self) -> &'static str {
        "containers-started-as-needed"
    }

    fn supports(&self, context: &InvocationContext) -> bool {
        context.service_start
    }

    async fn inspect(&self, request: &WorkRequest) -> Result<WorkOutcome> {
        tracing::debug!("getBdio(): containerPathToTarfile: {}", request.container_path);
        let first = self.settings.variant;

        match self.dispatch(first, request).await? {
            WorkOutcome::Redirected(signal) if self.settings.follow_redirect => {
                match signal.target {
                    Some(target) if target != first => {
                        tracing::info!(
                            "Inspector for {} redirected to {}; retrying there",
                            first,
                            target
                        );
                        self.dispatch(target, request).await
                    }
                    _ => Ok(WorkOutcome::Redirected(signal)),
                }
            }
            outcome => Ok(outcome),
        }
    }
}
