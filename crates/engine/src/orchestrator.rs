use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dbkeeper_core::ReportSummary;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::ports::{Notification, Notifier, NotifySettings};
use crate::runner::ScheduleRunner;
use crate::trigger::TriggerCadence;

/// Owns every schedule plus the low-frequency reporting job. Schedules run
/// as independent spawned tasks; a failure inside one never reaches the
/// others or the reporting loop.
pub struct Orchestrator {
    schedules: Vec<(Arc<ScheduleRunner>, TriggerCadence)>,
    notifier: Arc<dyn Notifier>,
    notify: NotifySettings,
    report_cadence: Option<TriggerCadence>,
}

impl Orchestrator {
    pub fn new(
        schedules: Vec<(Arc<ScheduleRunner>, TriggerCadence)>,
        notifier: Arc<dyn Notifier>,
        notify: NotifySettings,
        report_cadence: Option<TriggerCadence>,
    ) -> Self {
        Self {
            schedules,
            notifier,
            notify,
            report_cadence,
        }
    }

    /// Runs every schedule once immediately, then follows each schedule's
    /// cron cadence plus the reporting cadence. Runs until aborted.
    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::new();
        for (runner, cadence) in &self.schedules {
            info!(
                schedule = %runner.schedule().name,
                cron = %runner.schedule().cron,
                directory = %runner.schedule().directory.display(),
                "starting schedule"
            );
            handles.push(tokio::spawn(schedule_loop(
                Arc::clone(runner),
                cadence.clone(),
            )));
        }
        if let Some(cadence) = self.report_cadence.clone() {
            let orchestrator = Arc::clone(&self);
            handles.push(tokio::spawn(report_loop(orchestrator, cadence)));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "periodic task ended unexpectedly");
            }
        }
    }

    /// One attempt per schedule, for the one-shot mode.
    pub async fn run_all_once(&self) {
        for (runner, _) in &self.schedules {
            runner.run_once().await;
        }
    }

    /// Aggregate over every schedule's history. Read-only: reporting never
    /// mutates history.
    pub async fn aggregate_summary(&self) -> ReportSummary {
        let mut outcomes = Vec::new();
        for (runner, _) in &self.schedules {
            outcomes.extend(runner.history().await);
        }
        ReportSummary::from_outcomes(&outcomes)
    }

    /// Renders and sends one aggregate report. Best effort: a delivery
    /// failure is logged and dropped, never propagated to the schedules.
    pub async fn send_report(&self) {
        let summary = self.aggregate_summary().await;
        info!(
            attempts = summary.attempts,
            successes = summary.successes,
            failures = summary.failures,
            "sending aggregate backup report"
        );
        let notification = Notification {
            recipient: self.notify.recipient.clone(),
            sender: self.notify.sender.clone(),
            subject: "Database Backup Report".to_owned(),
            body: summary.render(),
        };
        if let Err(err) = self.notifier.send(&notification).await {
            warn!(error = %err, "report delivery failed");
        }
    }
}

async fn schedule_loop(runner: Arc<ScheduleRunner>, cadence: TriggerCadence) {
    // One immediate attempt at startup, then the cron cadence.
    runner.run_once().await;
    loop {
        let now = Utc::now();
        let Some(next) = cadence.next_after(now) else {
            warn!(
                schedule = %runner.schedule().name,
                "cron expression has no future firings, stopping trigger"
            );
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        sleep(wait).await;
        runner.run_once().await;
    }
}

async fn report_loop(orchestrator: Arc<Orchestrator>, cadence: TriggerCadence) {
    loop {
        let now = Utc::now();
        let Some(next) = cadence.next_after(now) else {
            warn!("reporting cron expression has no future firings, stopping reports");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        sleep(wait).await;
        orchestrator.send_report().await;
    }
}
