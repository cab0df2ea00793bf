//! Strategies for getting work to an inspector sidecar.
//!
//! Each strategy declares whether it applies to the current invocation; the
//! [`ClientSelector`] picks the first one that does. New strategies plug in
//! without touching existing ones.

mod already_running;
mod on_demand;

use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::{ChannelConnector, WorkOutcome};
use crate::config::InspectorConfig;
use crate::runtime::ContainerRuntime;
use crate::sidecar::{InspectorError, Result, WorkRequest};

pub use already_running::AlreadyRunningClient;
pub use on_demand::{OnDemandClient, OnDemandSettings};

/// Facts that decide which strategy applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    /// Sidecars may be started by us.
    pub service_start: bool,
    /// A sidecar is already running at this base URL.
    pub service_url: Option<String>,
}

/// One way of delegating work to a sidecar.
#[async_trait]
pub trait InspectorClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this strategy handles `context`.
    fn supports(&self, context: &InvocationContext) -> bool;

    /// Run `request` to completion or redirect.
    async fn inspect(&self, request: &WorkRequest) -> Result<WorkOutcome>;
}

/// Ordered set of strategies.
#[derive(Default)]
pub struct ClientSelector {
    clients: Vec<Arc<dyn InspectorClient>>,
}

impl ClientSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a strategy after the ones already registered.
    pub fn register(mut self, client: Arc<dyn InspectorClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Standard strategies wired from configuration: on-demand first (when a
    /// container runtime is available), then already-running.
    pub fn from_config(
        config: &InspectorConfig,
        runtime: Option<Arc<dyn ContainerRuntime>>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let mut selector = Self::new();
        if let Some(runtime) = runtime {
            selector = selector.register(Arc::new(OnDemandClient::new(
                Arc::new(config.instance_directory()),
                runtime,
                Arc::clone(&connector),
                OnDemandSettings::from(config),
            )));
        }
        if let Some(url) = &config.service_url {
            selector = selector.register(Arc::new(AlreadyRunningClient::new(
                url.clone(),
                connector,
                config.request_timeout(),
            )));
        }
        selector
    }

    /// First strategy that supports `context`.
    pub fn select(&self, context: &InvocationContext) -> Result<Arc<dyn InspectorClient>> {
        let client = self
            .clients
            .iter()
            .find(|client| client.supports(context))
            .ok_or(InspectorError::NotApplicable)?;
        tracing::debug!("Selected inspector client: {}", client.name());
        Ok(Arc::clone(client))
    }
}
