// backuptool/src/backup/s3_upload.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::ObjectCannedAcl;
use std::path::Path;
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{BackupError, Result};

/// Destination for finished archives.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn upload(&self, bucket: &str, object_path: &str, local_path: &Path) -> Result<()>;
}

/// Uploads to an S3-compatible object store such as MinIO.
pub struct S3Sink {
    client: s3::Client,
    project: Option<String>,
}

impl S3Sink {
    pub async fn new(storage_config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&storage_config.endpoint_url)
            .region(Region::new(storage_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &storage_config.access_key_id,
                &storage_config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        // MinIO serves buckets under the path, not as virtual hosts.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        S3Sink {
            client: s3::Client::from_conf(s3_config),
            project: storage_config.project.clone(),
        }
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if !missing {
                    return Err(BackupError::Upload(format!(
                        "bucket check failed for {}: {}",
                        bucket,
                        DisplayErrorContext(&err)
                    )));
                }
            }
        }

        info!("🪣 Bucket {} does not exist, creating it", bucket);
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| {
                BackupError::Upload(format!(
                    "bucket creation failed for {}: {}",
                    bucket,
                    DisplayErrorContext(&err)
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl StorageSink for S3Sink {
    async fn upload(&self, bucket: &str, object_path: &str, local_path: &Path) -> Result<()> {
        let key = object_key(self.project.as_deref(), object_path);
        info!(
            "Attempting to upload {} to bucket {} with key {}",
            local_path.display(),
            bucket,
            key
        );

        self.ensure_bucket(bucket).await?;

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            BackupError::Upload(format!(
                "failed to read {} for upload: {}",
                local_path.display(),
                e
            ))
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .acl(ObjectCannedAcl::Private)
            .body(body);
        if let Some(project) = &self.project {
            request = request.metadata("project", project);
        }

        request.send().await.map_err(|err| {
            BackupError::Upload(format!(
                "failed to upload {} to {}/{}: {}",
                local_path.display(),
                bucket,
                key,
                DisplayErrorContext(&err)
            ))
        })?;

        info!("✅ Successfully uploaded {} to {}/{}", local_path.display(), bucket, key);
        Ok(())
    }
}

/// Full object key: the object path under the optional project prefix, with `/` separators.
pub fn object_key(project: Option<&str>, object_path: &str) -> String {
    let object_path = object_path.replace('\\', "/");
    let object_path = object_path.trim_start_matches('/');
    match project.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(project) => format!("{}/{}", project, object_path),
        None => object_path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_with_project_prefix() {
        assert_eq!(object_key(Some("ybex"), "site/site-ts.tar.gz"), "ybex/site/site-ts.tar.gz");
        assert_eq!(object_key(Some("/ybex/"), "/site/a.gz"), "ybex/site/a.gz");
    }

    #[test]
    fn test_object_key_without_project() {
        assert_eq!(object_key(None, "site/site-ts.tar.gz"), "site/site-ts.tar.gz");
        assert_eq!(object_key(Some(""), "db\\app.sql"), "db/app.sql");
    }
}
