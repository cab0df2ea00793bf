//! `inspect` command.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;

use crate::channel::{ChannelConnector, HttpConnector, WorkOutcome};
use crate::client::ClientSelector;
use crate::config::InspectorConfig;
use crate::platform::PlatformVariant;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::sidecar::WorkRequest;

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Image tarball on this host
    #[arg(long)]
    pub tarfile: PathBuf,

    /// Where the tarball lands inside the sidecar
    #[arg(long)]
    pub container_path: String,

    /// Name of the output the sidecar produces
    #[arg(long)]
    pub filename: String,

    /// Let the sidecar delete the tarball when done
    #[arg(long)]
    pub cleanup: bool,

    /// Platform to inspect on (defaults to INSPECTOR_DEFAULT_OS)
    #[arg(long)]
    pub os: Option<PlatformVariant>,
}

impl InspectArgs {
    fn work_request(&self) -> WorkRequest {
        WorkRequest {
            host_path: self.tarfile.clone(),
            container_path: self.container_path.clone(),
            filename: self.filename.clone(),
            cleanup: self.cleanup,
        }
    }
}

/// Run an inspection and print its payload to stdout.
///
/// A redirect prints the suggested platform to stderr and exits non-zero.
pub async fn run_inspect_command(
    args: InspectArgs,
    config: &InspectorConfig,
) -> anyhow::Result<ExitCode> {
    let mut config = config.clone();
    if let Some(os) = args.os {
        config.default_os = os;
    }

    let runtime: Option<Arc<dyn ContainerRuntime>> = if config.service_start {
        Some(Arc::new(DockerRuntime::connect().await?))
    } else {
        None
    };
    let connector: Arc<dyn ChannelConnector> = Arc::new(HttpConnector);

    let selector = ClientSelector::from_config(&config, runtime, connector);
    let client = selector.select(&config.invocation_context())?;
    tracing::debug!("Inspecting {} with {}", args.tarfile.display(), client.name());

    match client.inspect(&args.work_request()).await? {
        WorkOutcome::Completed(payload) => {
            println!("{}", payload);
            Ok(ExitCode::SUCCESS)
        }
        WorkOutcome::Redirected(signal) => {
            match signal.target {
                Some(target) => eprintln!(
                    "Inspector redirected the request (HTTP {}): retry with --os {}",
                    signal.status, target
                ),
                None => eprintln!(
                    "Inspector redirected the request (HTTP {}) to an unrecognised platform: {}",
                    signal.status,
                    signal.location.as_deref().unwrap_or(signal.body.as_str())
                ),
            }
            Ok(ExitCode::from(3))
        }
    }
}
