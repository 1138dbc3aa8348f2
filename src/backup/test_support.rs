// Fakes for the external collaborators: dump tools and the object store.
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backup::s3_upload::StorageSink;
use crate::errors::{BackupError, Result};
use crate::utils::process::{CommandOutput, CommandRunner, CommandSpec, StdoutTarget};

/// Pretends to be the dump tools: records every invocation and writes
/// plausible output where the real tool would.
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    fail_with: Option<String>,
}

impl FakeRunner {
    pub fn succeeding() -> Self {
        FakeRunner {
            calls: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn failing(stderr: &str) -> Self {
        FakeRunner {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(stderr.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn materialize(spec: &CommandSpec) -> std::io::Result<()> {
        if let StdoutTarget::File(path) = &spec.stdout {
            fs::write(path, b"-- fake dump output\n")?;
        }
        let value_after = |flag: &str| {
            spec.args
                .iter()
                .position(|a| a == flag)
                .and_then(|i| spec.args.get(i + 1))
        };
        if let Some(out) = value_after("--out") {
            let db = value_after("--db").map(String::as_str).unwrap_or("db");
            let collection_dir = Path::new(out).join(db);
            fs::create_dir_all(&collection_dir)?;
            fs::write(collection_dir.join("items.bson"), b"fake bson")?;
        }
        if let Some(out) = value_after("-f") {
            fs::write(out, b"-- fake pg_dump output\n")?;
        }
        if spec.program == "docker" {
            let host_dir = spec
                .args
                .iter()
                .find_map(|a| a.strip_suffix(":/vackup"));
            let name = spec
                .args
                .iter()
                .find_map(|a| a.strip_prefix("/vackup/"));
            if let (Some(dir), Some(name)) = (host_dir, name) {
                fs::write(Path::new(dir).join(name), b"fake volume tar")?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Self::materialize(spec).map_err(|e| BackupError::io("Fake tool failed for", Path::new(&spec.program), e))?;

        Ok(match &self.fail_with {
            Some(stderr) => CommandOutput {
                code: Some(1),
                success: false,
                stderr: stderr.clone(),
            },
            None => CommandOutput {
                code: Some(0),
                success: true,
                ..Default::default()
            },
        })
    }
}

/// One call to the fake object store.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub bucket: String,
    pub object_path: String,
    pub local_path: PathBuf,
    pub file_existed: bool,
}

/// Object store stand-in that remembers what it was asked to upload.
#[derive(Default)]
pub struct RecordingSink {
    uploads: Mutex<Vec<RecordedUpload>>,
    reject: bool,
}

impl RecordingSink {
    pub fn rejecting() -> Self {
        RecordingSink {
            uploads: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageSink for RecordingSink {
    async fn upload(&self, bucket: &str, object_path: &str, local_path: &Path) -> Result<()> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            bucket: bucket.to_string(),
            object_path: object_path.to_string(),
            local_path: local_path.to_path_buf(),
            file_existed: local_path.is_file(),
        });
        if self.reject {
            return Err(BackupError::Upload("access denied".to_string()));
        }
        Ok(())
    }
}
