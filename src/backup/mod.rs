pub(crate) mod archive; // tarball and gzip creation
pub(crate) mod capture; // source type dispatch, folder and volume capture
pub(crate) mod db_dump; // mongodump / pg_basebackup / pg_dump / mysqldump
pub(crate) mod logic; // per-job orchestration
pub(crate) mod s3_upload; // storage sink
#[cfg(test)]
pub(crate) mod test_support;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{AppConfig, JobDescriptor};
use crate::schedule::{BackupScheduler, wait_for_shutdown_signal};
use crate::utils::process::SystemCommandRunner;
use logic::{BackupOrchestrator, run_jobs_sequentially};
use s3_upload::S3Sink;

/// Public entry point for the backup process.
///
/// Unscheduled jobs run right away, in configuration order. Scheduled jobs are
/// then handed to the scheduler, which runs until CTRL+C or SIGTERM.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<()> {
    let sink = Arc::new(S3Sink::new(&app_config.storage).await);
    let orchestrator = Arc::new(BackupOrchestrator::new(
        sink,
        Arc::new(SystemCommandRunner),
        app_config.temp_root.join(&app_config.project),
        app_config.command_timeout,
    ));
    let bucket = app_config.storage.bucket_name.clone();

    let (scheduled, immediate): (Vec<JobDescriptor>, Vec<JobDescriptor>) = app_config
        .jobs
        .iter()
        .cloned()
        .partition(|job| job.schedule().is_some());

    if !immediate.is_empty() {
        let results = run_jobs_sequentially(&orchestrator, &immediate, &bucket).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Immediate backups finished: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );
    }

    let scheduler = BackupScheduler::new(Arc::clone(&orchestrator), bucket);
    let mut handles = Vec::new();
    for job in scheduled {
        match scheduler.register(job) {
            Ok(handle) => handles.push(handle),
            Err(e) => error!("❌ Failed to schedule: {}", e),
        }
    }

    if handles.is_empty() {
        info!("No scheduled backups found. Exiting");
        return Ok(());
    }

    info!("Scheduler started with {} job(s). Press CTRL+C to exit", handles.len());
    wait_for_shutdown_signal().await?;

    info!("Shutting down scheduler...");
    scheduler.stop();
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
    info!("Scheduler stopped");
    Ok(())
}
