// backuptool/src/schedule/mod.rs
use anyhow::Context;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backup::logic::BackupOrchestrator;
use crate::config::JobDescriptor;
use crate::errors::{BackupError, JobError, Result};

/// Parses a cron expression.
///
/// Classic five-field expressions (`0 3 * * *`) are accepted and fire at
/// second zero; six and seven field expressions are used as they are.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let expression = expression.trim();
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| BackupError::Config(format!("invalid cron expression '{}': {}", expression, e)))
}

/// Next firing strictly after both `now` and the previous firing.
fn next_firing(schedule: &Schedule, now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    let reference = match last {
        Some(last) if last > now => last,
        _ => now,
    };
    schedule.after(&reference).next()
}

/// Fires scheduled jobs until stopped.
///
/// Each firing is spawned as its own task, so a slow run never delays the
/// next firing and two runs of one job may overlap.
pub struct BackupScheduler {
    orchestrator: Arc<BackupOrchestrator>,
    bucket: String,
    shutdown_tx: broadcast::Sender<()>,
}

impl BackupScheduler {
    pub fn new(orchestrator: Arc<BackupOrchestrator>, bucket: String) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        BackupScheduler {
            orchestrator,
            bucket,
            shutdown_tx,
        }
    }

    /// Starts the trigger loop for one job. Fails only when its schedule is invalid.
    pub fn register(&self, job: JobDescriptor) -> std::result::Result<JoinHandle<()>, JobError> {
        let expression = job.schedule().unwrap_or_default().to_string();
        let schedule = parse_schedule(&expression).map_err(|e| JobError::new(job.name.clone(), e))?;

        let orchestrator = Arc::clone(&self.orchestrator);
        let bucket = self.bucket.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("⏰ Scheduled backup {} with '{}'", job.name, expression);

        Ok(tokio::spawn(async move {
            let mut last_fired = None;
            loop {
                let now = Utc::now();
                let Some(next) = next_firing(&schedule, now, last_fired) else {
                    warn!("Schedule for {} has no upcoming firing, stopping", job.name);
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(wait) => {
                        last_fired = Some(next);
                        let orchestrator = Arc::clone(&orchestrator);
                        let job = job.clone();
                        let bucket = bucket.clone();
                        tokio::spawn(async move {
                            info!("Starting scheduled backup: {}", job.name);
                            if let Err(e) = orchestrator.run(&job, &bucket).await {
                                error!("❌ {}", e);
                            }
                        });
                    }
                }
            }
        }))
    }

    /// Stops accepting new firings. Runs already in flight keep going.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Waits for CTRL+C or SIGTERM.
pub async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for CTRL+C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("Failed to listen for CTRL+C")?;
    Ok(())
}
