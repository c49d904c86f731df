//! One spec.md §4.6 tick for a single configuration, from admission
//! checks through a finished [`Job`].
//!
//! Shared by the monitor loop in [`crate::Scheduler`] and by the
//! `test-sync-system` CLI command, which drives the same path exactly
//! once without scheduling anything (SPEC_FULL.md §4.10).

use his_sync_client::{ImportStrategy, MergeMode};
use his_sync_data::{AggregateOptions, EventOptions, TrackerOptions};
use his_sync_detector::MonitorScope;
use his_sync_lifecycle::{self, CannotSync, Phase, SyncPlan, TickOutcome};
use his_sync_metadata::{known_resource_names, resolve_order, Family, PipelineOptions};
use his_sync_orchestrator::{run_job, JobOptions};
use his_sync_store::{
    AutoSyncSettings, ConfigId, ImportStrategyKind, Job, JobStatus, JobType, MergeModeKind, ReplicationCache, Store,
    SyncConfiguration,
};

use crate::client_registry::ClientRegistry;
use crate::error::{SchedulerError, SchedulerResult};

/// Outcome of one [`drive_tick`] call: mirrors
/// [`his_sync_lifecycle::TickOutcome`] but resolves the admitted case
/// down to the finished `Job`.
#[derive(Debug)]
pub enum TickReport {
    /// Auto-sync disabled for this configuration.
    Disabled,
    CannotSync(CannotSync),
    NoChanges,
    Ran(Job),
}

fn monitor_scope(auto_sync: &AutoSyncSettings) -> MonitorScope {
    if !auto_sync.monitor_metadata {
        return MonitorScope { metadata_resources: Vec::new(), monitor_data: auto_sync.monitor_data };
    }
    let mut resources: Vec<String> = known_resource_names().into_iter().map(str::to_string).collect();
    if let Some(include) = &auto_sync.include_resources {
        resources.retain(|r| include.contains(r));
    }
    if let Some(exclude) = &auto_sync.exclude_resources {
        resources.retain(|r| !exclude.contains(r));
    }
    MonitorScope { metadata_resources: resources, monitor_data: auto_sync.monitor_data }
}

fn to_client_strategy(kind: ImportStrategyKind) -> ImportStrategy {
    match kind {
        ImportStrategyKind::CreateOnly => ImportStrategy::CreateOnly,
        ImportStrategyKind::UpdateOnly => ImportStrategy::UpdateOnly,
        ImportStrategyKind::CreateAndUpdate => ImportStrategy::CreateAndUpdate,
        ImportStrategyKind::Delete => ImportStrategy::Delete,
    }
}

fn to_client_merge_mode(kind: MergeModeKind) -> MergeMode {
    match kind {
        MergeModeKind::Replace => MergeMode::Replace,
        MergeModeKind::Merge => MergeMode::Merge,
    }
}

/// Builds the orchestrator's per-job options from a configuration's
/// stored knobs, pulling in every metadata family (the dependency
/// resolver narrows per-phase already) and the configuration's date
/// window for the data pipelines.
fn job_options_for(config: &SyncConfiguration) -> JobOptions {
    let families = resolve_order(&Family::ALL);
    let start_date = config.date_start.map(|d| d.to_rfc3339());
    let end_date = config.date_end.map(|d| d.to_rfc3339());

    let mut aggregate = AggregateOptions::new();
    aggregate.start_date = start_date.clone();
    aggregate.end_date = end_date.clone();

    let mut events = EventOptions::new();
    events.start_date = start_date;
    events.end_date = end_date;

    JobOptions {
        families,
        metadata: PipelineOptions {
            import_strategy: to_client_strategy(config.import_strategy),
            merge_mode: to_client_merge_mode(config.merge_mode),
            page_size: config.page_size,
        },
        aggregate,
        events,
        tracker: TrackerOptions::new(),
    }
}

fn job_type_for(plan: &SyncPlan) -> JobType {
    match plan.phases.as_slice() {
        [Phase::Metadata] => JobType::Metadata,
        [Phase::Aggregate] => JobType::Aggregate,
        [Phase::Events] => JobType::Events,
        [Phase::Tracker] => JobType::Tracker,
        phases if phases.contains(&Phase::Metadata) => JobType::Complete,
        _ => JobType::AllData,
    }
}

/// Runs one spec.md §4.6 tick for `config_id`: the admission checks of
/// steps 1-4, change detection in step 5, and — if admitted — a full Job
/// through the orchestrator, reporting the outcome back to the lifecycle
/// manager in step 6.
pub async fn drive_tick(
    store: &Store,
    cache: &ReplicationCache,
    clients: &ClientRegistry,
    config_id: ConfigId,
) -> SchedulerResult<TickReport> {
    let config = store.get_configuration(config_id)?;
    let auto_sync = store
        .get_auto_sync(config_id)?
        .ok_or(SchedulerError::MissingAutoSyncSettings(config_id))?;
    let has_active_job = store.has_active_job(config_id)?;

    let source_instance = store.get_instance(config.source_id)?;
    let destination_instance = store.get_instance(config.destination_id)?;
    let source_client = clients.get_or_create(&source_instance);
    let destination_client = clients.get_or_create(&destination_instance);

    let scope = monitor_scope(&auto_sync);
    let outcome = his_sync_lifecycle::tick(source_client.as_ref(), cache, &config, &auto_sync, has_active_job, &scope).await?;

    let plan = match outcome {
        TickOutcome::Disabled => return Ok(TickReport::Disabled),
        TickOutcome::CannotSync(reason) => return Ok(TickReport::CannotSync(reason)),
        TickOutcome::NoChanges => return Ok(TickReport::NoChanges),
        TickOutcome::Admitted { plan, .. } => plan,
    };

    let mut job = Job::new(config_id, job_type_for(&plan));
    store.put_job(&job)?;

    let options = job_options_for(&config);
    let run_result = run_job(source_client.as_ref(), destination_client.as_ref(), &mut job, &plan, &options).await;

    match run_result {
        Ok(()) => {
            store.put_job(&job)?;
            if matches!(job.status, JobStatus::Failed) {
                his_sync_lifecycle::record_failure(cache, config_id, auto_sync.cooldown_after_error_secs);
            } else {
                // Watermark = this sync's start time (spec.md §4.5), so the
                // next tick's `lastUpdated:gt:` filter only sees changes
                // made during or after this run.
                let watermark = job.started_at.unwrap_or_else(chrono::Utc::now);
                his_sync_lifecycle::record_success(cache, config_id, source_instance.id, &scope, watermark);
            }
            Ok(TickReport::Ran(job))
        }
        Err(err) => {
            job.last_error = Some(err.to_string());
            job.finish(JobStatus::Failed);
            store.put_job(&job)?;
            his_sync_lifecycle::record_failure(cache, config_id, auto_sync.cooldown_after_error_secs);
            Err(SchedulerError::Orchestrator(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use his_sync_store::{ExecutionMode, Instance, SyncType};

    fn setup() -> (Store, ConfigId) {
        let store = Store::open_temporary().unwrap();
        let source = Instance::new("source", "http://127.0.0.1:1/api", "u", "p", true, false).unwrap();
        let destination = Instance::new("destination", "http://127.0.0.1:1/api", "u", "p", false, true).unwrap();
        store.put_instance(&source).unwrap();
        store.put_instance(&destination).unwrap();
        let config = SyncConfiguration::new(
            source.id,
            destination.id,
            SyncType::Metadata,
            ImportStrategyKind::CreateAndUpdate,
            MergeModeKind::Merge,
            ExecutionMode::Automatic,
            50,
            None,
            None,
        )
        .unwrap();
        store.put_configuration(&config).unwrap();
        let settings = AutoSyncSettings::new(config.id, 60).unwrap();
        store.put_auto_sync(&settings).unwrap();
        (store, config.id)
    }

    #[tokio::test]
    async fn missing_auto_sync_settings_is_an_error() {
        let store = Store::open_temporary().unwrap();
        let source = Instance::new("s", "http://127.0.0.1:1/api", "u", "p", true, false).unwrap();
        let destination = Instance::new("d", "http://127.0.0.1:1/api", "u", "p", false, true).unwrap();
        store.put_instance(&source).unwrap();
        store.put_instance(&destination).unwrap();
        let config = SyncConfiguration::new(
            source.id,
            destination.id,
            SyncType::Metadata,
            ImportStrategyKind::CreateAndUpdate,
            MergeModeKind::Merge,
            ExecutionMode::Manual,
            50,
            None,
            None,
        )
        .unwrap();
        store.put_configuration(&config).unwrap();
        let cache = ReplicationCache::default();
        let clients = ClientRegistry::new();
        let err = drive_tick(&store, &cache, &clients, config.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::MissingAutoSyncSettings(_)));
    }

    #[tokio::test]
    async fn unreachable_source_fails_the_tick_and_arms_cooldown() {
        let (store, config_id) = setup();
        let cache = ReplicationCache::default();
        let clients = ClientRegistry::new();
        let err = drive_tick(&store, &cache, &clients, config_id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Lifecycle(_)));
    }
}
