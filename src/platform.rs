//! Identity and location types shared by the ensurer and delegator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating-system flavor of an inspector sidecar.
///
/// Each variant is served by its own image and listens on its own port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformVariant {
    Alpine,
    Centos,
    Ubuntu,
}

impl PlatformVariant {
    /// All variants, in port-offset order.
    pub const ALL: [PlatformVariant; 3] = [
        PlatformVariant::Alpine,
        PlatformVariant::Centos,
        PlatformVariant::Ubuntu,
    ];

    /// Lowercase name used in image repositories and container labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformVariant::Alpine => "alpine",
            PlatformVariant::Centos => "centos",
            PlatformVariant::Ubuntu => "ubuntu",
        }
    }

    /// Offset from the base port at which this variant's service listens.
    pub fn port_offset(&self) -> u16 {
        match self {
            PlatformVariant::Alpine => 0,
            PlatformVariant::Centos => 1,
            PlatformVariant::Ubuntu => 2,
        }
    }

    /// Find the first variant named anywhere in `text`, ignoring case.
    ///
    /// Used on redirect bodies, which may be a bare name, JSON, or prose.
    pub fn find_in(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        Self::ALL
            .iter()
            .filter_map(|v| lower.find(v.as_str()).map(|idx| (idx, *v)))
            .min_by_key(|(idx, _)| *idx)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for PlatformVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform variant '{0}' (expected alpine, centos or ubuntu)")]
pub struct UnknownPlatform(pub String);

impl FromStr for PlatformVariant {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alpine" => Ok(PlatformVariant::Alpine),
            "centos" => Ok(PlatformVariant::Centos),
            "ubuntu" => Ok(PlatformVariant::Ubuntu),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

/// Resolved network location of a sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEndpoint {
    /// Host address (usually `localhost`).
    pub host: String,
    /// Port on the host.
    pub port: u16,
    /// Port inside the container.
    pub container_port: u16,
}

impl ServiceEndpoint {
    /// Get the HTTP base URL for this endpoint.
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.http_url())
    }
}

/// Repository and tag of the image backing a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCoordinates {
    pub repository: String,
    pub tag: String,
}

impl fmt::Display for ImageCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Identifier of a running sidecar container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
