//! `doctor` command: can sidecars be started here?

use std::process::ExitCode;

use crate::config::InspectorConfig;
use crate::platform::PlatformVariant;
use crate::runtime::check_docker;

/// Check Docker and the image configuration, printing one line per check.
pub async fn run_doctor_command(config: &InspectorConfig) -> anyhow::Result<ExitCode> {
    let mut healthy = true;

    if config.service_start {
        let report = check_docker().await;
        println!("  docker        {}", report.status.as_str());
        if let Some(hint) = report.hint {
            println!("                {}", hint);
        }
        healthy &= report.status.is_ok();
    } else {
        println!("  docker        skipped (INSPECTOR_SERVICE_START=false)");
    }

    if let Some(url) = &config.service_url {
        println!("  service url   {}", url);
    }

    let directory = config.instance_directory();
    for variant in PlatformVariant::ALL {
        match directory.image_coordinates(variant).await {
            Ok(image) => println!("  image {:7} {}", variant, image),
            Err(e) => {
                println!("  image {:7} error: {}", variant, e);
                healthy = false;
            }
        }
    }

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
