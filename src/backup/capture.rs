// backuptool/src/backup/capture.rs
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::backup::{archive, db_dump};
use crate::config::{JobDescriptor, PostgresMode};
use crate::errors::{BackupError, Result};
use crate::utils::process::{CommandRunner, CommandSpec};

/// The closed set of source types a job can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Folder,
    Volume,
    MongoDb,
    Postgres(PostgresMode),
    MySql,
}

impl SourceKind {
    /// Resolves a job's `type`, failing with `UnsupportedType` for anything unknown.
    pub fn for_job(job: &JobDescriptor) -> Result<Self> {
        match job.source_type.trim().to_ascii_lowercase().as_str() {
            "folder" => Ok(SourceKind::Folder),
            "volume" => Ok(SourceKind::Volume),
            "mongodb" | "mongo" => Ok(SourceKind::MongoDb),
            "postgres" | "postgresql" => Ok(SourceKind::Postgres(job.postgres_mode.unwrap_or_default())),
            "mysql" => Ok(SourceKind::MySql),
            _ => Err(BackupError::UnsupportedType(job.source_type.clone())),
        }
    }
}

/// Shared inputs of one capture: where to write and how to run tools.
pub struct CaptureContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub output_dir: &'a Path,
    pub timeout: Duration,
    pub timestamp: String,
}

/// Produces exactly one archive for `job` inside `ctx.output_dir`.
pub async fn capture(kind: SourceKind, job: &JobDescriptor, ctx: &CaptureContext<'_>) -> Result<PathBuf> {
    match kind {
        SourceKind::Folder => capture_folder(job, ctx).await,
        SourceKind::Volume => capture_volume(job, ctx).await,
        SourceKind::MongoDb => db_dump::dump_mongodb(&job.source, ctx).await,
        SourceKind::Postgres(mode) => db_dump::dump_postgres(&job.source, mode, ctx).await,
        SourceKind::MySql => db_dump::dump_mysql(&job.source, ctx).await,
    }
}

async fn capture_folder(job: &JobDescriptor, ctx: &CaptureContext<'_>) -> Result<PathBuf> {
    let source = PathBuf::from(job.source.trim());
    let target = ctx
        .output_dir
        .join(format!("{}-{}.tar.gz", file_safe(&job.name), ctx.timestamp));

    let archive_path = run_blocking(move || archive::tar_directory(&source, &target)).await?;
    info!("📦 Folder backup created: {}", archive_path.display());
    Ok(archive_path)
}

/// Archives a Docker volume through a throwaway busybox container.
async fn capture_volume(job: &JobDescriptor, ctx: &CaptureContext<'_>) -> Result<PathBuf> {
    let volume = job.source.trim();
    let archive_name = format!("{}-{}.tar.gz", file_safe(&job.name), ctx.timestamp);
    let output_dir = ctx
        .output_dir
        .canonicalize()
        .map_err(|e| BackupError::io("Failed to resolve output directory", ctx.output_dir, e))?;

    let spec = CommandSpec::new("docker", ctx.timeout).args([
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{}:/vackup-volume", volume),
        "-v".to_string(),
        format!("{}:/vackup", output_dir.display()),
        "busybox".to_string(),
        "tar".to_string(),
        "-zcvf".to_string(),
        format!("/vackup/{}", archive_name),
        "/vackup-volume".to_string(),
    ]);
    ctx.runner.run(&spec).await?.check("docker volume backup")?;

    let archive_path = ctx.output_dir.join(&archive_name);
    if !archive_path.is_file() {
        return Err(BackupError::Capture {
            tool: "docker volume backup".to_string(),
            status: "0".to_string(),
            stderr: format!("expected archive {} was not produced", archive_path.display()),
        });
    }
    info!("📦 Volume backup created: {}", archive_path.display());
    Ok(archive_path)
}

/// Moves archive work off the async runtime.
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| BackupError::Io {
        context: "Archive task did not complete".to_string(),
        source: io::Error::other(e),
    })?
}

/// Job names end up in file names; keep them to a single path component.
pub(crate) fn file_safe(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
