//! `probe` command.

use std::sync::Arc;

use serde::Serialize;

use crate::channel::{ChannelConnector, HttpConnector};
use crate::config::InspectorConfig;
use crate::platform::{ImageCoordinates, PlatformVariant, ServiceEndpoint};
use crate::sidecar::probe_health;

/// Health of one platform's sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub variant: PlatformVariant,
    pub endpoint: ServiceEndpoint,
    pub healthy: bool,
    /// Image that would be started for this platform.
    pub image: Option<ImageCoordinates>,
    /// Why the image could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_error: Option<String>,
}

/// Probe each variant's health endpoint. Never starts containers.
pub async fn probe_variants(
    config: &InspectorConfig,
    connector: &dyn ChannelConnector,
    variants: &[PlatformVariant],
) -> Vec<ProbeReport> {
    let directory = config.instance_directory();
    let mut reports = Vec::with_capacity(variants.len());

    for &variant in variants {
        let endpoint = directory.endpoint(variant);
        let healthy = match connector.connect(&endpoint.http_url(), config.request_timeout()) {
            Ok(channel) => probe_health(channel.as_ref()).await,
            Err(e) => {
                tracing::warn!("Cannot probe {}: {}", endpoint, e);
                false
            }
        };
        let (image, image_error) = match directory.image_coordinates(variant).await {
            Ok(image) => (Some(image), None),
            Err(e) => (None, Some(e.to_string())),
        };
        reports.push(ProbeReport {
            variant,
            endpoint,
            healthy,
            image,
            image_error,
        });
    }

    reports
}

/// Print the health of one or every platform's sidecar.
pub async fn run_probe_command(
    os: Option<PlatformVariant>,
    json: bool,
    config: &InspectorConfig,
) -> anyhow::Result<()> {
    let variants = match os {
        Some(variant) => vec![variant],
        None => PlatformVariant::ALL.to_vec(),
    };
    let connector: Arc<dyn ChannelConnector> = Arc::new(HttpConnector);
    let reports = probe_variants(config, connector.as_ref(), &variants).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        let state = if report.healthy { "up" } else { "down" };
        let image = match (&report.image, &report.image_error) {
            (Some(image), _) => image.to_string(),
            (None, Some(error)) => format!("<{}>", error),
            (None, None) => "-".to_string(),
        };
        println!(
            "  {:8} {:26} {:5} {}",
            report.variant,
            report.endpoint.http_url(),
            state,
            image
        );
    }
    Ok(())
}
