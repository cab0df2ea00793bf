use std::path::PathBuf;
use std::time::Duration;

use crate::client::InvocationContext;
use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;
use crate::platform::PlatformVariant;
use crate::sidecar::{ImageSource, InstanceDirectory, ReadinessPolicy};

/// Image inspector sidecar configuration.
///
/// Controls whether sidecars are started on demand or expected to be running
/// already, where they listen, which images back them, and how long a fresh
/// one may take to come up.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Start sidecar containers as needed.
    pub service_start: bool,
    /// Base URL of a sidecar that is already running.
    pub service_url: Option<String>,
    /// Platform used when a request does not name one.
    pub default_os: PlatformVariant,
    pub host: String,
    pub base_port: u16,
    pub container_base_port: u16,
    pub image_organization: String,
    pub image_repository_prefix: String,
    pub image_tag: String,
    /// TOML file overriding the built-in image coordinates.
    pub image_manifest: Option<PathBuf>,
    /// Suffix appended to container names.
    pub run_id: String,
    /// Request timeout in milliseconds, applied to health and work requests.
    pub command_timeout_ms: u64,
    pub start_max_attempts: u32,
    pub start_poll_interval_secs: u64,
    /// Re-dispatch once when a sidecar redirects to another platform.
    pub follow_redirect: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        let policy = ReadinessPolicy::default();
        Self {
            service_start: true,
            service_url: None,
            default_os: PlatformVariant::Ubuntu,
            host: "localhost".to_string(),
            base_port: 8080,
            container_base_port: 8080,
            image_organization: "blackducksoftware".to_string(),
            image_repository_prefix: "hub-imageinspector-ws".to_string(),
            image_tag: env!("CARGO_PKG_VERSION").to_string(),
            image_manifest: None,
            run_id: "1".to_string(),
            command_timeout_ms: 120_000,
            start_max_attempts: policy.max_attempts,
            start_poll_interval_secs: policy.interval.as_secs(),
            follow_redirect: false,
        }
    }
}

impl InspectorConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_os = optional_env("INSPECTOR_DEFAULT_OS")?
            .map(|s| s.parse::<PlatformVariant>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "INSPECTOR_DEFAULT_OS".to_string(),
                message: e.to_string(),
            })?
            .unwrap_or(defaults.default_os);

        let base_port = parse_optional_env("INSPECTOR_BASE_PORT", defaults.base_port)?;
        let container_base_port =
            parse_optional_env("INSPECTOR_CONTAINER_BASE_PORT", defaults.container_base_port)?;
        let highest_offset = PlatformVariant::ALL
            .iter()
            .map(|v| v.port_offset())
            .max()
            .unwrap_or(0);
        for (key, port) in [
            ("INSPECTOR_BASE_PORT", base_port),
            ("INSPECTOR_CONTAINER_BASE_PORT", container_base_port),
        ] {
            if port == 0 || port.checked_add(highest_offset).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be between 1 and {}", u16::MAX - highest_offset),
                });
            }
        }

        let start_max_attempts =
            parse_optional_env("INSPECTOR_START_MAX_ATTEMPTS", defaults.start_max_attempts)?;
        if start_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INSPECTOR_START_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let config = Self {
            service_start: parse_bool_env("INSPECTOR_SERVICE_START", defaults.service_start)?,
            service_url: optional_env("INSPECTOR_SERVICE_URL")?,
            default_os,
            host: optional_env("INSPECTOR_HOST")?.unwrap_or(defaults.host),
            base_port,
            container_base_port,
            image_organization: optional_env("INSPECTOR_IMAGE_ORGANIZATION")?
                .unwrap_or(defaults.image_organization),
            image_repository_prefix: optional_env("INSPECTOR_IMAGE_REPOSITORY_PREFIX")?
                .unwrap_or(defaults.image_repository_prefix),
            image_tag: optional_env("INSPECTOR_IMAGE_TAG")?.unwrap_or(defaults.image_tag),
            image_manifest: optional_env("INSPECTOR_IMAGE_MANIFEST")?.map(PathBuf::from),
            run_id: optional_env("INSPECTOR_RUN_ID")?.unwrap_or(defaults.run_id),
            command_timeout_ms: parse_optional_env(
                "COMMAND_TIMEOUT_MS",
                defaults.command_timeout_ms,
            )?,
            start_max_attempts,
            start_poll_interval_secs: parse_optional_env(
                "INSPECTOR_START_POLL_INTERVAL_SECS",
                defaults.start_poll_interval_secs,
            )?,
            follow_redirect: parse_bool_env("INSPECTOR_FOLLOW_REDIRECT", defaults.follow_redirect)?,
        };
        config.check_strategy()?;
        Ok(config)
    }

    /// At least one strategy must be able to handle work.
    fn check_strategy(&self) -> Result<(), ConfigError> {
        if !self.service_start && self.service_url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "INSPECTOR_SERVICE_URL".to_string(),
                hint: "set it to a running inspector, or enable INSPECTOR_SERVICE_START"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Per-request timeout: the command timeout in whole seconds, at least one.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs((self.command_timeout_ms / 1000).max(1))
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            max_attempts: self.start_max_attempts,
            interval: Duration::from_secs(self.start_poll_interval_secs),
        }
    }

    pub fn instance_directory(&self) -> InstanceDirectory {
        let images = match &self.image_manifest {
            Some(path) => ImageSource::Manifest(path.clone()),
            None => ImageSource::Builtin {
                organization: self.image_organization.clone(),
                repository_prefix: self.image_repository_prefix.clone(),
                tag: self.image_tag.clone(),
            },
        };
        InstanceDirectory {
            host: self.host.clone(),
            base_port: self.base_port,
            container_base_port: self.container_base_port,
            images,
            run_id: self.run_id.clone(),
        }
    }

    /// What strategy selection gets to see.
    pub fn invocation_context(&self) -> InvocationContext {
        InvocationContext {
            service_start: self.service_start,
            service_url: self.service_url.clone(),
        }
    }
}
