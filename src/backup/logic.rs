// backuptool/src/backup/logic.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{Builder as TempFileBuilder, TempDir};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::backup::capture::{self, CaptureContext, SourceKind, file_safe};
use crate::backup::s3_upload::StorageSink;
use crate::config::JobDescriptor;
use crate::errors::{BackupError, JobError, Result};
use crate::utils::artifact_timestamp;
use crate::utils::process::CommandRunner;

/// What a successful job run produced.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub job: String,
    pub bucket: String,
    pub object_path: String,
    pub size_bytes: u64,
    pub duration: Duration,
}

/// Runs one backup job end to end: capture, upload, clean up.
///
/// Every run works inside its own freshly created directory under `temp_root`,
/// so overlapping runs of the same or different jobs never share files.
pub struct BackupOrchestrator {
    sink: Arc<dyn StorageSink>,
    runner: Arc<dyn CommandRunner>,
    temp_root: PathBuf,
    command_timeout: Duration,
}

impl BackupOrchestrator {
    pub fn new(
        sink: Arc<dyn StorageSink>,
        runner: Arc<dyn CommandRunner>,
        temp_root: PathBuf,
        command_timeout: Duration,
    ) -> Self {
        BackupOrchestrator {
            sink,
            runner,
            temp_root,
            command_timeout,
        }
    }

    /// Runs `job` and uploads its archive into `bucket`.
    ///
    /// Errors are tagged with the job name. Removing local files never turns a
    /// result into a failure; it is only logged.
    pub async fn run(&self, job: &JobDescriptor, bucket: &str) -> std::result::Result<BackupReport, JobError> {
        let span = info_span!("backup", job = %job.name, run_id = %Uuid::new_v4());
        self.run_job(job, bucket)
            .instrument(span)
            .await
            .map_err(|e| JobError::new(job.name.clone(), e))
    }

    async fn run_job(&self, job: &JobDescriptor, bucket: &str) -> Result<BackupReport> {
        let started = Instant::now();
        if job.name.trim().is_empty() {
            return Err(BackupError::Config("job name must not be empty".to_string()));
        }
        let kind = SourceKind::for_job(job)?;
        let run_dir = self.create_run_dir(&job.name)?;

        let ctx = CaptureContext {
            runner: self.runner.as_ref(),
            output_dir: run_dir.path(),
            timeout: self.command_timeout,
            timestamp: artifact_timestamp(),
        };

        let artifact = match capture::capture(kind, job, &ctx).await {
            Ok(path) => path,
            Err(e) => {
                dispose_run_dir(run_dir);
                return Err(e);
            }
        };

        let result = self.upload_artifact(job, bucket, &artifact).await;

        remove_artifact(&artifact);
        dispose_run_dir(run_dir);

        let (object_path, size_bytes) = result?;
        let report = BackupReport {
            job: job.name.clone(),
            bucket: bucket.to_string(),
            object_path,
            size_bytes,
            duration: started.elapsed(),
        };
        info!(
            "🎉 Successfully processed backup {} -> {}/{} ({} bytes in {:.1?})",
            report.job, report.bucket, report.object_path, report.size_bytes, report.duration
        );
        Ok(report)
    }

    async fn upload_artifact(&self, job: &JobDescriptor, bucket: &str, artifact: &Path) -> Result<(String, u64)> {
        let size_bytes = fs::metadata(artifact)
            .map_err(|e| BackupError::io("Failed to stat archive", artifact, e))?
            .len();
        let object_path = object_path_for(job.destination_folder(), artifact)?;

        self.sink.upload(bucket, &object_path, artifact).await?;
        Ok((object_path, size_bytes))
    }

    fn create_run_dir(&self, job_name: &str) -> Result<TempDir> {
        fs::create_dir_all(&self.temp_root)
            .map_err(|e| BackupError::io("Failed to create temp directory", &self.temp_root, e))?;
        TempFileBuilder::new()
            .prefix(&format!("{}-", file_safe(job_name)))
            .tempdir_in(&self.temp_root)
            .map_err(|e| BackupError::io("Failed to create run directory in", &self.temp_root, e))
    }
}

/// Object path for an archive: `<folder>/<archive file name>`, `/`-separated.
///
/// Only the archive's file name is used, so the local temp location never
/// leaks into the bucket layout.
pub fn object_path_for(folder: &str, artifact: &Path) -> Result<String> {
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::Config(format!("archive path {} has no file name", artifact.display())))?;

    let folder = folder.replace('\\', "/");
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        return Ok(file_name);
    }
    Ok(format!("{}/{}", folder, file_name))
}

fn remove_artifact(artifact: &Path) {
    match fs::remove_file(artifact) {
        Ok(()) => info!("🧹 Temporary file {} removed", artifact.display()),
        Err(e) => warn!(path = %artifact.display(), error = %e, "Failed to remove temp file"),
    }
}

fn dispose_run_dir(run_dir: TempDir) {
    let path = run_dir.path().to_path_buf();
    if let Err(e) = run_dir.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove run directory");
    }
}

/// Runs jobs one after another in the given order. A failing job is logged
/// and never stops the ones after it.
pub async fn run_jobs_sequentially(
    orchestrator: &BackupOrchestrator,
    jobs: &[JobDescriptor],
    bucket: &str,
) -> Vec<std::result::Result<BackupReport, JobError>> {
    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
        info!("🚀 Starting immediate backup: {}", job.name);
        let result = orchestrator.run(job, bucket).await;
        if let Err(e) = &result {
            error!("❌ {}", e);
        }
        results.push(result);
    }
    results
}
