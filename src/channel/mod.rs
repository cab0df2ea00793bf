//! Request/response channel to a sidecar.
//!
//! A channel is bound to one base URL. Connections never follow redirects:
//! a 3xx from the work endpoint is how a sidecar says "send this to another
//! platform", and that answer must reach the caller.

pub mod http;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::platform::PlatformVariant;

pub use http::{HttpConnector, HttpWorkChannel};

/// Failure of a request on an established channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct TransportError {
    /// HTTP status, when the server answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "request failed (HTTP {}): {}", status, self.message),
            None => write!(f, "request failed: {}", self.message),
        }
    }
}

/// Failure to construct a channel.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("cannot build HTTP client: {0}")]
    ClientBuild(String),
}

/// A sidecar's instruction to resend the work to a different platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignal {
    pub status: u16,
    /// Platform named in the response body, if one could be recognised.
    pub target: Option<PlatformVariant>,
    /// `Location` header, if present.
    pub location: Option<String>,
    pub body: String,
}

/// Non-error result of a work submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// The sidecar produced its payload.
    Completed(String),
    /// The sidecar asked for the work to go elsewhere.
    Redirected(RedirectSignal),
}

impl WorkOutcome {
    pub fn payload(&self) -> Option<&str> {
        match self {
            WorkOutcome::Completed(payload) => Some(payload),
            WorkOutcome::Redirected(_) => None,
        }
    }
}

/// Connection to one sidecar.
#[async_trait]
pub trait WorkChannel: Send + Sync {
    /// Base URL this channel talks to.
    fn base_url(&self) -> &str;

    /// GET `path` relative to the base URL and return the body.
    async fn get(&self, path: &str) -> Result<String, TransportError>;

    /// Ask the sidecar to process the artifact staged at `container_path`.
    async fn submit_work(
        &self,
        container_path: &str,
        filename: &str,
        cleanup: bool,
    ) -> Result<WorkOutcome, TransportError>;
}

/// Builds channels for base URLs.
pub trait ChannelConnector: Send + Sync {
    fn connect(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn WorkChannel>, ConnectError>;
}
