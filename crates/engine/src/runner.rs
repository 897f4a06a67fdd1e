use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Error, Result};
use chrono::Utc;
use dbkeeper_core::{eviction_candidates, BackupOutcome, EngineError};
use dbkeeper_storage::ArtifactStore;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionController;
use crate::ports::{ConnectionInfo, DumpExecutor, Notification, Notifier, NotifySettings};

/// One named retention/trigger unit. Each schedule owns its directory
/// exclusively; no two schedules share one.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: String,
    pub cron: String,
    pub directory: PathBuf,
    pub max_backups: usize,
}

/// Mutable per-schedule state: the append-only outcome log and the success
/// counter deciding notification cadence. Explicitly owned here rather than
/// shared process-wide.
struct RunnerState {
    history: Vec<BackupOutcome>,
    successes_since_notify: u32,
}

/// Drives one schedule's attempts: admission, dump, retention, history,
/// notification. Failures stay contained in this schedule; other schedules
/// and the reporting job are unaffected.
pub struct ScheduleRunner {
    schedule: Schedule,
    store: ArtifactStore,
    admission: Arc<AdmissionController>,
    dump: Arc<dyn DumpExecutor>,
    notifier: Arc<dyn Notifier>,
    notify: NotifySettings,
    connection: ConnectionInfo,
    state: Mutex<RunnerState>,
    // Held for the whole attempt: a trigger firing while an attempt is
    // still running is suppressed via try_lock.
    attempt_gate: Mutex<()>,
}

impl ScheduleRunner {
    pub fn new(
        schedule: Schedule,
        store: ArtifactStore,
        admission: Arc<AdmissionController>,
        dump: Arc<dyn DumpExecutor>,
        notifier: Arc<dyn Notifier>,
        notify: NotifySettings,
        connection: ConnectionInfo,
    ) -> Self {
        Self {
            schedule,
            store,
            admission,
            dump,
            notifier,
            notify,
            connection,
            state: Mutex::new(RunnerState {
                history: Vec::new(),
                successes_since_notify: 0,
            }),
            attempt_gate: Mutex::new(()),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Snapshot of this schedule's outcome history, oldest first.
    pub async fn history(&self) -> Vec<BackupOutcome> {
        self.state.lock().await.history.clone()
    }

    /// One triggered attempt. Overlapping triggers on this schedule are
    /// no-ops; triggers on other schedules proceed independently.
    pub async fn run_once(&self) {
        let Ok(_attempt) = self.attempt_gate.try_lock() else {
            debug!(
                schedule = %self.schedule.name,
                "previous attempt still running, skipping trigger"
            );
            return;
        };

        let started = Instant::now();
        let result = self.attempt().await;
        let duration_ms = started.elapsed().as_millis() as i64;
        match result {
            Ok(artifact_name) => self.record_success(artifact_name, duration_ms).await,
            Err(err) => self.record_failure(err, duration_ms).await,
        }
    }

    async fn attempt(&self) -> Result<String> {
        // Space is shared across schedules, so admission looks at the whole
        // pool; retention below is scoped to this schedule's directory only.
        self.admission.ensure_capacity().await?;
        let artifact_name = self
            .dump
            .dump(&self.connection, &self.schedule.directory)
            .await?;
        self.apply_retention()?;
        Ok(artifact_name)
    }

    fn apply_retention(&self) -> Result<()> {
        let artifacts = self.store.list(&self.schedule.directory)?;
        for candidate in eviction_candidates(&artifacts, self.schedule.max_backups) {
            info!(
                schedule = %self.schedule.name,
                path = %candidate.path.display(),
                "removing backup beyond retention cap"
            );
            self.store.delete(candidate)?;
        }
        Ok(())
    }

    async fn record_success(&self, artifact_name: String, duration_ms: i64) {
        info!(
            schedule = %self.schedule.name,
            artifact = %artifact_name,
            duration_ms,
            "backup complete"
        );
        let notify_due = {
            let mut state = self.state.lock().await;
            state.history.push(BackupOutcome::success(
                artifact_name.clone(),
                duration_ms,
                Utc::now(),
            ));
            state.successes_since_notify += 1;
            if state.successes_since_notify >= self.notify.success_notify_every.max(1) {
                state.successes_since_notify = 0;
                true
            } else {
                false
            }
        };
        if notify_due {
            self.notify(
                "Database Backup Complete",
                format!(
                    "Schedule {}: backup {} completed in {} ms.",
                    self.schedule.name, artifact_name, duration_ms
                ),
            )
            .await;
        }
    }

    async fn record_failure(&self, err: Error, duration_ms: i64) {
        error!(schedule = %self.schedule.name, error = %err, "backup attempt failed");
        let detail = format!("{err:#}");
        {
            let mut state = self.state.lock().await;
            state
                .history
                .push(BackupOutcome::failure(detail.clone(), duration_ms, Utc::now()));
        }
        let disk_pressure = err
            .downcast_ref::<EngineError>()
            .is_some_and(EngineError::is_disk_pressure);
        let subject = if disk_pressure {
            "Database Backup Failed: Disk Pressure Unresolved"
        } else {
            "Database Backup Failed"
        };
        self.notify(subject, format!("Schedule {}: {detail}", self.schedule.name))
            .await;
    }

    async fn notify(&self, subject: &str, body: String) {
        let notification = Notification {
            recipient: self.notify.recipient.clone(),
            sender: self.notify.sender.clone(),
            subject: subject.to_owned(),
            body,
        };
        if let Err(err) = self.notifier.send(&notification).await {
            // Delivery failures are logged, never escalated.
            warn!(
                schedule = %self.schedule.name,
                error = %err,
                "notification delivery failed"
            );
        }
    }
}
