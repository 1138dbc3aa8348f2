use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Connection string parse error: {0}")]
    Parse(String),

    #[error("Unsupported backup type: {0}")]
    UnsupportedType(String),

    #[error("{tool} failed with status {status}\nStderr: {stderr}")]
    Capture {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} did not finish within {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackupError {
    /// Wraps an I/O error with a description of the operation and the path involved.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        BackupError::Io {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }
}

/// A failure of one job, tagged with the job's name.
#[derive(Error, Debug)]
#[error("Backup job '{job}' failed: {source}")]
pub struct JobError {
    pub job: String,
    #[source]
    pub source: BackupError,
}

impl JobError {
    pub fn new(job: impl Into<String>, source: BackupError) -> Self {
        JobError {
            job: job.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
