//! Inspector sidecar orchestration.
//!
//! Makes sure an image inspector service is running for the requested
//! platform (starting a container when nothing answers), stages the image
//! tarball into it, and submits the inspection request.
//!
//! - [`platform`]: platform variants, endpoints, image coordinates
//! - [`config`]: env-driven configuration
//! - [`channel`]: HTTP channel to a sidecar
//! - [`runtime`]: container runtime abstraction and its Docker backend
//! - [`sidecar`]: health probing, provisioning and work delegation
//! - [`client`]: strategies that tie the above together
//! - [`cli`]: command-line interface

pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod platform;
pub mod runtime;
pub mod sidecar;
pub mod testing;

pub use channel::{RedirectSignal, WorkOutcome};
pub use client::{ClientSelector, InspectorClient, InvocationContext};
pub use config::Config;
pub use platform::PlatformVariant;
pub use sidecar::{InspectorError, WorkRequest};
