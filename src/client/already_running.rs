//! Strategy for a sidecar someone else keeps running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{ChannelConnector, WorkOutcome};
use crate::client::{InspectorClient, InvocationContext};
use crate::sidecar::{InspectorError, Result, WorkDelegator, WorkRequest, probe_health};

/// Submits work to a sidecar at a fixed URL.
///
/// Never starts containers and never stages files: the artifact must already
/// be visible to the sidecar at the request's container path.
pub struct AlreadyRunningClient {
    url: String,
    connector: Arc<dyn ChannelConnector>,
    timeout: Duration,
}

impl AlreadyRunningClient {
    pub fn new(url: String, connector: Arc<dyn ChannelConnector>, timeout: Duration) -> Self {
        Self {
            url,
            connector,
            timeout,
        }
    }
}

#[async_trait]
impl InspectorClient for AlreadyRunningClient {
    fn name(&self) -> &'static str {
        "already-running"
    }

    fn supports(&self, context: &InvocationContext) -> bool {
        !context.service_start && context.service_url.is_some()
    }

    async fn inspect(&self, request: &WorkRequest) -> Result<WorkOutcome> {
        tracing::info!("ImageInspector URL: {}", self.url);
        let channel = self.connector.connect(&self.url, self.timeout).map_err(|source| {
            InspectorError::ConnectionConstruction {
                url: self.url.clone(),
                timeout_secs: self.timeout.as_secs(),
                source,
            }
        })?;

        if !probe_health(channel.as_ref()).await {
            return Err(InspectorError::ServiceUnavailable {
                url: self.url.clone(),
            });
        }

        WorkDelegator::submit(channel.as_ref(), request).await
    }
}
