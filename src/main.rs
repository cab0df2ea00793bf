//! Inspector sidecar - main entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use inspector_sidecar::{
    cli::{Cli, Command, run_doctor_command, run_inspect_command, run_probe_command},
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env()?;
    tracing::debug!(
        service_start = config.inspector.service_start,
        service_url = ?config.inspector.service_url,
        default_os = %config.inspector.default_os,
        "Configuration resolved"
    );

    match cli.command {
        Command::Inspect(args) => run_inspect_command(args, &config.inspector).await,
        Command::Probe { os, json } => {
            run_probe_command(os, json, &config.inspector).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Doctor => run_doctor_command(&config.inspector).await,
    }
}

/// Logs go to stderr; stdout carries the inspection payload.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("inspector_sidecar=info"));

    let json = std::env::var("INSPECTOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
