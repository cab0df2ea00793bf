//! On-demand image inspector sidecars.
//!
//! An inspector sidecar is a long-lived container that analyzes image
//! tarballs on our behalf. This module makes sure one is running for the
//! requested platform and hands it work:
//! - Probe the sidecar's health endpoint
//! - Pull and start its image when nothing answers
//! - Poll with a bounded, fixed-interval budget until it reports up
//! - Copy the artifact into the container and submit the work request
//!
//! Containers are not stopped afterwards; the next call finds them healthy.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              OnDemandClient                                │
//! │                                                                            │
//! │   InstanceDirectory ──▶ endpoint + image ──▶ SidecarEnsurer                │
//! │                                                   │                        │
//! │                               ┌───────────────────┴──────────────┐         │
//! │                               ▼                                  ▼         │
//! │                      ┌──────────────┐                 ┌──────────────────┐ │
//! │                      │ Probe health │──down──────────▶│ Pull, start,     │ │
//! │                      │ (WorkChannel)│                 │ poll (Runtime)   │ │
//! │                      └──────────────┘                 └──────────────────┘ │
//! │                               │ up                               │ up      │
//! │                               ▼                                  ▼         │
//! │                      ┌──────────────────────────────────────────────────┐  │
//! │                      │ WorkDelegator: stage artifact, submit request    │  │
//! │                      └──────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod delegate;
pub mod directory;
pub mod ensurer;
pub mod error;
pub mod health;

pub use delegate::{WorkDelegator, WorkRequest, container_parent_dir};
pub use directory::{DirectoryError, ImageSource, InstanceDirectory};
pub use ensurer::{
    INSPECTOR_APP_NAME, Pause, PauseInterrupted, ReadinessPolicy, ReadySidecar, SidecarEnsurer,
    TokioPause,
};
pub use error::{InspectorError, Result};
pub use health::{HEALTH_PATH, STATUS_UP_MARKER, is_healthy_body, probe_health};
