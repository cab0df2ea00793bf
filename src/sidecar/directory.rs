//! Maps a platform variant to where its sidecar listens and which image runs it.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::platform::{ImageCoordinates, PlatformVariant, ServiceEndpoint};

/// Failure to resolve image coordinates for a variant.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("cannot read image manifest {}: {source}", path.display())]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse image manifest {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("image manifest {} has no entry for '{variant}'", path.display())]
    MissingVariant {
        path: PathBuf,
        variant: PlatformVariant,
    },
}

/// Where image coordinates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `{organization}/{repository_prefix}-{variant}:{tag}`.
    Builtin {
        organization: String,
        repository_prefix: String,
        tag: String,
    },
    /// A TOML file with an `[images.<variant>]` table per variant.
    Manifest(PathBuf),
}

impl Default for ImageSource {
    fn default() -> Self {
        ImageSource::Builtin {
            organization: "blackducksoftware".to_string(),
            repository_prefix: "hub-imageinspector-ws".to_string(),
            tag: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImageManifest {
    #[serde(default)]
    images: HashMap<String, ImageCoordinates>,
}

impl ImageManifest {
    /// Entry for `variant`: the lowercase key if present, otherwise the single
    /// key matching case-insensitively.
    ///
    /// `Err(None)` means no entry; `Err(Some(_))` names conflicting keys.
    fn select(mut self, variant: PlatformVariant) -> Result<ImageCoordinates, Option<String>> {
        if let Some(image) = self.images.remove(variant.as_str()) {
            return Ok(image);
        }
        let mut matches: Vec<_> = self
            .images
            .into_iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(variant.as_str()))
            .collect();
        match matches.len() {
            0 => Err(None),
            1 => Ok(matches.remove(0).1),
            _ => {
                let mut keys: Vec<_> = matches.into_iter().map(|(key, _)| key).collect();
                keys.sort();
                Err(Some(format!(
                    "ambiguous entries for '{variant}': {}",
                    keys.join(", ")
                )))
            }
        }
    }
}

/// Stateless lookup from [`PlatformVariant`] to endpoint, image and container name.
#[derive(Debug, Clone)]
pub struct InstanceDirectory {
    /// Host the sidecars are reached on.
    pub host: String,
    /// Host port of the variant with offset 0.
    pub base_port: u16,
    /// Container port of the variant with offset 0.
    pub container_base_port: u16,
    pub images: ImageSource,
    /// Suffix appended to derived container names.
    pub run_id: String,
}

impl Default for InstanceDirectory {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            base_port: 8080,
            container_base_port: 8080,
            images: ImageSource::default(),
            run_id: "1".to_string(),
        }
    }
}

impl InstanceDirectory {
    /// Resolve the endpoint for a variant. Pure: same input, same output.
    pub fn endpoint(&self, variant: PlatformVariant) -> ServiceEndpoint {
        ServiceEndpoint {
            host: self.host.clone(),
            port: self.base_port.saturating_add(variant.port_offset()),
            container_port: self
                .container_base_port
                .saturating_add(variant.port_offset()),
        }
    }

    /// Look up the image backing a variant.
    ///
    /// Manifest-backed sources re-read the file on every call, so edits are
    /// picked up without a restart and a missing file surfaces immediately.
    pub async fn image_coordinates(
        &self,
        variant: PlatformVariant,
    ) -> Result<ImageCoordinates, DirectoryError> {
        match &self.images {
            ImageSource::Builtin {
                organization,
                repository_prefix,
                tag,
            } => Ok(ImageCoordinates {
                repository: format!("{organization}/{repository_prefix}-{variant}"),
                tag: tag.clone(),
            }),
            ImageSource::Manifest(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|source| {
                    DirectoryError::ManifestUnreadable {
                        path: path.clone(),
                        source,
                    }
                })?;
                let manifest: ImageManifest =
                    toml::from_str(&raw).map_err(|e| DirectoryError::ManifestInvalid {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                manifest.select(variant).map_err(|reason| match reason {
                    Some(reason) => DirectoryError::ManifestInvalid {
                        path: path.clone(),
                        reason,
                    },
                    None => DirectoryError::MissingVariant {
                        path: path.clone(),
                        variant,
                    },
                })
            }
        }
    }

    /// Deterministic container name for an image: last repository segment
    /// (non-alphanumerics replaced by `-`) followed by the run id.
    pub fn container_name(&self, image: &ImageCoordinates) -> String {
        let base = image
            .repository
            .rsplit('/')
            .next()
            .unwrap_or(&image.repository);
        let sanitized: String = base
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}-{}", sanitized.trim_matches('-'), self.run_id)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_endpoint_is_deterministic() {
        let directory = InstanceDirectory::default();
        for variant in PlatformVariant::ALL {
            assert_eq!(directory.endpoint(variant), directory.endpoint(variant));
        }
        assert_eq!(directory.endpoint(PlatformVariant::Alpine).port, 8080);
        assert_eq!(directory.endpoint(PlatformVariant::Centos).port, 8081);
        assert_eq!(
            directory.endpoint(PlatformVariant::Ubuntu).http_url(),
            "http://localhost:8082"
        );
    }

    #[test]
    fn test_endpoint_saturates_near_port_limit() {
        let directory = InstanceDirectory {
            base_port: u16::MAX,
            ..Default::default()
        };
        assert_eq!(directory.endpoint(PlatformVariant::Ubuntu).port, u16::MAX);
    }

    #[tokio::test]
    async fn test_builtin_coordinates() {
        let directory = InstanceDirectory {
            images: ImageSource::Builtin {
                organization: "acme".to_string(),
                repository_prefix: "inspector".to_string(),
                tag: "2.0".to_string(),
            },
            ..Default::default()
        };
        let image = directory
            .image_coordinates(PlatformVariant::Centos)
            .await
            .unwrap();
        assert_eq!(image.to_string(), "acme/inspector-centos:2.0");
    }

    #[tokio::test]
    async fn test_manifest_coordinates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[images.ubuntu]\nrepository = \"insp\"\ntag = \"1.0\"\n\n[images.Alpine]\nrepository = \"a\"\ntag = \"3\""
        )
        .unwrap();
        let directory = InstanceDirectory {
            images: ImageSource::Manifest(file.path().to_path_buf()),
            ..Default::default()
        };

        let ubuntu = directory
            .image_coordinates(PlatformVariant::Ubuntu)
            .await
            .unwrap();
        assert_eq!(ubuntu.to_string(), "insp:1.0");

        let alpine = directory
            .image_coordinates(PlatformVariant::Alpine)
            .await
            .unwrap();
        assert_eq!(alpine.repository, "a");

        let missing = directory.image_coordinates(PlatformVariant::Centos).await;
        assert!(matches!(missing, Err(DirectoryError::MissingVariant { .. })));
    }

    #[tokio::test]
    async fn test_manifest_lowercase_key_wins_over_case_variants() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[images.Ubuntu]\nrepository = \"upper\"\ntag = \"1\"\n\n[images.ubuntu]\nrepository = \"lower\"\ntag = \"2\""
        )
        .unwrap();
        let directory = InstanceDirectory {
            images: ImageSource::Manifest(file.path().to_path_buf()),
            ..Default::default()
        };

        for _ in 0..3 {
            let image = directory
                .image_coordinates(PlatformVariant::Ubuntu)
                .await
                .unwrap();
            assert_eq!(image.to_string(), "lower:2");
        }
    }

    #[tokio::test]
    async fn test_manifest_ambiguous_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[images.Alpine]\nrepository = \"a\"\ntag = \"1\"\n\n[images.ALPINE]\nrepository = \"b\"\ntag = \"2\""
        )
        .unwrap();
        let directory = InstanceDirectory {
            images: ImageSource::Manifest(file.path().to_path_buf()),
            ..Default::default()
        };

        let err = directory
            .image_coordinates(PlatformVariant::Alpine)
            .await
            .unwrap_err();
        match err {
            DirectoryError::ManifestInvalid { reason, .. } => {
                assert!(reason.contains("ALPINE, Alpine"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let directory = InstanceDirectory {
            images: ImageSource::Manifest(dir.path().join("absent.toml")),
            ..Default::default()
        };
        let result = directory.image_coordinates(PlatformVariant::Ubuntu).await;
        assert!(matches!(
            result,
            Err(DirectoryError::ManifestUnreadable { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "images = 7").unwrap();
        let directory = InstanceDirectory {
            images: ImageSource::Manifest(file.path().to_path_buf()),
            ..Default::default()
        };
        let result = directory.image_coordinates(PlatformVariant::Ubuntu).await;
        assert!(matches!(result, Err(DirectoryError::ManifestInvalid { .. })));
    }

    #[test]
    fn test_container_name_from_repository() {
        let directory = InstanceDirectory::default();
        let image = ImageCoordinates {
            repository: "insp".to_string(),
            tag: "1.0".to_string(),
        };
        assert_eq!(directory.container_name(&image), "insp-1");

        let nested = ImageCoordinates {
            repository: "registry.local:5000/org/hub_imageinspector.ws".to_string(),
            tag: "4.1".to_string(),
        };
        assert_eq!(
            directory.container_name(&nested),
            "hub-imageinspector-ws-1"
        );
    }
}
