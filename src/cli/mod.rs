//! CLI command handling.
//!
//! Provides subcommands for:
//! - Inspecting an image tarball through a sidecar (`inspect`)
//! - Checking which sidecars answer their health endpoint (`probe`)
//! - Checking that Docker is usable (`doctor`)

mod doctor;
mod inspect;
mod probe;

pub use doctor::run_doctor_command;
pub use inspect::{InspectArgs, run_inspect_command};
pub use probe::{ProbeReport, run_probe_command};

use clap::{ColorChoice, Parser, Subcommand};

use crate::platform::PlatformVariant;

#[derive(Parser, Debug)]
#[command(name = "inspector-sidecar")]
#[command(about = "Start image inspector sidecars on demand and hand them work")]
#[command(
    long_about = "Ensures an image inspector service is running for a platform, stages the image tarball into it and submits the inspection.\nExamples:\n  inspector-sidecar inspect --tarfile image.tar --container-path /opt/work/image.tar --filename out.tar.gz\n  inspector-sidecar probe"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect an image tarball
    #[command(
        about = "Inspect an image tarball",
        long_about = "Makes sure the sidecar for the platform is up, copies the tarball into it and prints the result.\nExample: inspector-sidecar inspect --tarfile image.tar --container-path /opt/work/image.tar --filename out.tar.gz"
    )]
    Inspect(InspectArgs),

    /// Probe sidecar health endpoints
    #[command(
        about = "Probe sidecar health",
        long_about = "Checks the health endpoint of each platform's sidecar without starting anything.\nExample: inspector-sidecar probe --os alpine"
    )]
    Probe {
        /// Only probe this platform
        #[arg(long)]
        os: Option<PlatformVariant>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that Docker is installed and running
    #[command(
        about = "Run diagnostics",
        long_about = "Checks Docker availability and the image configuration.\nExample: inspector-sidecar doctor"
    )]
    Doctor,
}
