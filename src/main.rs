//! Backup Tool
//!
//! Captures folders, Docker volumes and databases into compressed archives
//! and ships them to S3-compatible object storage, once or on a cron schedule.

// backuptool/src/main.rs
mod backup;
mod config;
mod errors;
mod schedule;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    init_tracing();

    if !dotenv_loaded {
        info!("No .env file found, using only system environment variables");
    }

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

async fn run_app() -> Result<()> {
    // config.json next to the working directory unless a path is given as the first argument.
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    info!(
        "🚀 Starting backup process for project {} ({} job(s), bucket {})",
        app_config.project,
        app_config.jobs.len(),
        app_config.storage.bucket_name
    );
    backup::run_backup_flow(&app_config)
        .await
        .context("Backup process failed")
}
