//! Docker availability check for the `doctor` command.
//!
//! A missing daemon is the most common reason a sidecar never starts, so the
//! report carries a platform-specific hint for fixing it.

use crate::runtime::connect_docker;

/// Docker availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    /// Binary on PATH and daemon answering pings.
    Available,
    /// `docker` binary not on PATH.
    NotInstalled,
    /// Binary present but the daemon does not answer.
    NotRunning,
}

impl DockerStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, DockerStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DockerStatus::Available => "available",
            DockerStatus::NotInstalled => "not installed",
            DockerStatus::NotRunning => "not running",
        }
    }

    /// What the user should do next on host OS `os` (`std::env::consts::OS`).
    pub fn hint(&self, os: &str) -> Option<&'static str> {
        match (self, os) {
            (DockerStatus::Available, _) => None,
            (DockerStatus::NotInstalled, "macos") => {
                Some("Install Docker Desktop: https://docs.docker.com/desktop/install/mac-install/")
            }
            (DockerStatus::NotInstalled, "windows") => Some(
                "Install Docker Desktop: https://docs.docker.com/desktop/install/windows-install/",
            ),
            (DockerStatus::NotInstalled, _) => {
                Some("Install Docker Engine: https://docs.docker.com/engine/install/")
            }
            (DockerStatus::NotRunning, "macos") => Some("Start Docker Desktop, or run: open -a Docker"),
            (DockerStatus::NotRunning, "windows") => Some("Start Docker Desktop from the Start menu"),
            (DockerStatus::NotRunning, _) => Some("Start the daemon: sudo systemctl start docker"),
        }
    }
}

/// Result of [`check_docker`].
#[derive(Debug, Clone)]
pub struct DockerReport {
    pub status: DockerStatus,
    pub hint: Option<&'static str>,
}

/// Check whether Docker is installed and its daemon reachable.
pub async fn check_docker() -> DockerReport {
    let status = if !docker_binary_on_path() {
        DockerStatus::NotInstalled
    } else if connect_docker().await.is_ok() {
        DockerStatus::Available
    } else {
        DockerStatus::NotRunning
    };

    DockerReport {
        status,
        hint: status.hint(std::env::consts::OS),
    }
}

fn docker_binary_on_path() -> bool {
    let locator = if cfg!(windows) { "where" } else { "which" };
    std::process::Command::new(locator)
        .arg("docker")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
