use std::sync::Arc;

use anyhow::Result;
use dbkeeper_engine::{
    AdmissionController, DumpExecutor, Notifier, Orchestrator, ScheduleRunner, TriggerCadence,
};
use dbkeeper_storage::{ArtifactStore, DiskSpaceProbe, StatvfsProbe};

use crate::config::Settings;
use crate::dump::MysqldumpExecutor;
use crate::notify::MailGatewayNotifier;

/// Wires the production collaborators into an orchestrator.
pub fn build_orchestrator(settings: &Settings) -> Result<Arc<Orchestrator>> {
    let dump = Arc::new(MysqldumpExecutor::new(settings.dump_timeout));
    let notifier = Arc::new(MailGatewayNotifier::new(
        settings.notifier_endpoint.clone(),
        settings.sender_credentials.clone(),
    ));
    build_orchestrator_with(settings, dump, notifier, Arc::new(StatvfsProbe))
}

/// Same wiring with injectable collaborator ports.
pub fn build_orchestrator_with(
    settings: &Settings,
    dump: Arc<dyn DumpExecutor>,
    notifier: Arc<dyn Notifier>,
    probe: Arc<dyn DiskSpaceProbe>,
) -> Result<Arc<Orchestrator>> {
    let store = ArtifactStore::new();
    for schedule in &settings.schedules {
        store.ensure_directory(&schedule.directory)?;
    }

    let directories = settings
        .schedules
        .iter()
        .map(|s| s.directory.clone())
        .collect();
    let admission = Arc::new(AdmissionController::new(
        store,
        probe,
        settings.policy,
        settings.mount_point.clone(),
        directories,
    ));

    let mut runners = Vec::new();
    for schedule in &settings.schedules {
        let cadence = TriggerCadence::parse(&schedule.cron)?;
        let runner = Arc::new(ScheduleRunner::new(
            schedule.clone(),
            store,
            Arc::clone(&admission),
            Arc::clone(&dump),
            Arc::clone(&notifier),
            settings.notify.clone(),
            settings.connection.clone(),
        ));
        runners.push((runner, cadence));
    }

    let report_cadence = if settings.reporting_enabled {
        Some(TriggerCadence::parse(&settings.report_cron)?)
    } else {
        None
    };

    Ok(Arc::new(Orchestrator::new(
        runners,
        notifier,
        settings.notify.clone(),
        report_cadence,
    )))
}
