// backuptool/src/utils/process.rs
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use which::which;

use crate::errors::{BackupError, Result};

/// Where the child's standard output goes. Tools that write their result to
/// stdout get a file; everything else is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    Discard,
    File(PathBuf),
}

/// One invocation of an external tool.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub stdout: StdoutTarget,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdout: StdoutTarget::Discard,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdout_to(mut self, path: PathBuf) -> Self {
        self.stdout = StdoutTarget::File(path);
        self
    }
}

/// Outcome of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stderr: String,
}

impl CommandOutput {
    /// Converts a non-zero exit into a `Capture` error carrying the tool's stderr.
    pub fn check(self, tool: &str) -> Result<CommandOutput> {
        if self.success {
            return Ok(self);
        }
        Err(BackupError::Capture {
            tool: tool.to_string(),
            status: self
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "terminated by signal".to_string()),
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs external tools. Capture strategies only talk to this trait, so tests
/// can substitute a fake that never spawns anything.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Spawns real processes found on `PATH`.
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let program = which(&spec.program).map_err(|e| BackupError::Capture {
            tool: spec.program.clone(),
            status: "not found".to_string(),
            stderr: format!(
                "{} executable not found in PATH ({}). Please ensure the client tools are installed.",
                spec.program, e
            ),
        })?;
        debug!(program = %program.display(), args = ?redact_args(&spec.args), "Spawning external tool");

        let child = {
            let mut command = Command::new(&program);
            command
                .args(&spec.args)
                .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            match &spec.stdout {
                StdoutTarget::Discard => {
                    command.stdout(Stdio::null());
                }
                StdoutTarget::File(path) => {
                    let file = std::fs::File::create(path)
                        .map_err(|e| BackupError::io("Failed to create output file", path, e))?;
                    command.stdout(Stdio::from(file));
                }
            }

            command
                .spawn()
                .map_err(|e| BackupError::io("Failed to execute", &program, e))?
        };

        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| BackupError::io("Failed to wait for", &program, e))?,
            Err(_) => {
                return Err(BackupError::Timeout {
                    tool: spec.program.clone(),
                    secs: spec.timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Masks `--password=...` style arguments before they reach the logs.
fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|a| match a.split_once('=') {
            Some((flag, _)) if flag.contains("password") => format!("{}=****", flag),
            _ => a.clone(),
        })
        .collect()
}
