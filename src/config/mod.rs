// backuptool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_PROJECT: &str = "default";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3600;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub use_ssl: Option<bool>,
}

/// How a Postgres source is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostgresMode {
    /// `pg_basebackup` of the whole cluster as a gzipped tar.
    #[default]
    BaseBackup,
    /// `pg_dump` of the single database as plain SQL.
    Dump,
}

/// One configured backup job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default, rename = "path-save", alias = "path_save")]
    pub path_save: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub postgres_mode: Option<PostgresMode>,
}

impl JobDescriptor {
    /// Bucket folder for this job's archives: `path-save` when set, the job name otherwise.
    pub fn destination_folder(&self) -> &str {
        match self.path_save.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => &self.name,
        }
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub project: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub command_timeout_secs: Option<u64>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    #[serde(default)]
    pub backups: Vec<JobDescriptor>,
}

/// Everything the storage sink needs, resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub project: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project: String,
    pub temp_root: PathBuf,
    pub command_timeout: Duration,
    pub storage: StorageConfig,
    pub jobs: Vec<JobDescriptor>,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;

        Self::from_raw(raw_json_config, |key| env::var(key).ok())
    }

    /// Builds the application config, letting `MINIO_*` variables from `lookup`
    /// override the `s3_storage` section.
    pub fn from_raw(raw: RawJsonConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let project = raw
            .project
            .clone()
            .filter(|p| !p.trim().is_empty());
        let storage = resolve_storage_config(raw.s3_storage.as_ref(), project.clone(), &lookup)?;

        let temp_root = raw
            .temp_dir
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| env::temp_dir().join("backups"));

        let command_timeout = Duration::from_secs(
            raw.command_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        );

        if raw.backups.is_empty() {
            warn!("No backups are defined in the configuration. Nothing will run.");
        }

        Ok(AppConfig {
            project: project.unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            temp_root,
            command_timeout,
            storage,
            jobs: raw.backups,
        })
    }
}

fn resolve_storage_config(
    raw: Option<&JsonS3StorageConfig>,
    project: Option<String>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<StorageConfig> {
    let pick = |env_key: &str, json_value: Option<&String>| -> Option<String> {
        lookup(env_key)
            .or_else(|| json_value.cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let bucket_name = pick("MINIO_BUCKET_NAME", raw.and_then(|s| s.bucket_name.as_ref()))
        .context("MINIO_BUCKET_NAME environment variable (or s3_storage.bucket_name in config.json) is required")?;
    let endpoint = pick("MINIO_ENDPOINT", raw.and_then(|s| s.endpoint_url.as_ref()))
        .context("MINIO_ENDPOINT environment variable (or s3_storage.endpoint_url in config.json) is required")?;
    let access_key_id = pick("MINIO_ACCESS_KEY", raw.and_then(|s| s.access_key_id.as_ref()))
        .context("MINIO_ACCESS_KEY environment variable (or s3_storage.access_key_id in config.json) is required")?;
    let secret_access_key = pick("MINIO_SECRET_KEY", raw.and_then(|s| s.secret_access_key.as_ref()))
        .context("MINIO_SECRET_KEY environment variable (or s3_storage.secret_access_key in config.json) is required")?;
    let region = pick("MINIO_REGION", raw.and_then(|s| s.region.as_ref()))
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let use_ssl = match lookup("MINIO_USE_SSL") {
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
        None => raw.and_then(|s| s.use_ssl).unwrap_or(false),
    };

    Ok(StorageConfig {
        endpoint_url: with_scheme(&endpoint, use_ssl),
        region,
        access_key_id,
        secret_access_key,
        bucket_name,
        project,
    })
}

/// MinIO endpoints are usually given as `host:port`; the SDK wants a full URL.
fn with_scheme(endpoint: &str, use_ssl: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        let scheme = if use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, endpoint.trim_end_matches('/'))
    }
}
