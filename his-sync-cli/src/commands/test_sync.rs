//! `test-sync-system`: drives one diagnostic pass per configuration.
//!
//! `--dry-run` and `--metadata-only` stop short of running a real Job —
//! they probe connectivity and report what the change detector sees
//! without ever touching the destination. Without either flag the
//! command drives the exact same path the scheduler's monitor loop uses
//! ([`his_sync_scheduler::drive_tick`]), once, synchronously.

use his_sync_detector::{detect_changes, MonitorScope};
use his_sync_metadata::known_resource_names;
use his_sync_scheduler::{drive_tick, TickReport};
use his_sync_store::SyncConfiguration;

use crate::context::Context;
use crate::error::CliResult;

pub struct ProbeOutcome {
    pub reachable: bool,
    pub detail: String,
}

pub enum TestOutcome {
    Diagnostic { source: ProbeOutcome, destination: ProbeOutcome, has_changes: bool, metadata_changed: Vec<String> },
    Ran(TickReport),
}

fn scope_for(auto_sync: Option<&his_sync_store::AutoSyncSettings>, metadata_only: bool) -> MonitorScope {
    let mut resources: Vec<String> = known_resource_names().into_iter().map(str::to_string).collect();
    if let Some(settings) = auto_sync {
        if let Some(include) = &settings.include_resources {
            resources.retain(|r| include.contains(r));
        }
        if let Some(exclude) = &settings.exclude_resources {
            resources.retain(|r| !exclude.contains(r));
        }
    }
    let monitor_data = !metadata_only && auto_sync.map(|s| s.monitor_data).unwrap_or(false);
    MonitorScope { metadata_resources: resources, monitor_data }
}

pub async fn run_one(ctx: &Context, config: &SyncConfiguration, dry_run: bool, metadata_only: bool) -> CliResult<TestOutcome> {
    let auto_sync = ctx.store.get_auto_sync(config.id)?;

    if dry_run || metadata_only || auto_sync.is_none() {
        let source_instance = ctx.store.get_instance(config.source_id)?;
        let destination_instance = ctx.store.get_instance(config.destination_id)?;
        let source_client = ctx.clients.get_or_create(&source_instance);
        let destination_client = ctx.clients.get_or_create(&destination_instance);

        let source = match source_client.probe().await {
            Ok(info) => ProbeOutcome { reachable: true, detail: format!("{info:?}") },
            Err(err) => ProbeOutcome { reachable: false, detail: err.to_string() },
        };
        let destination = match destination_client.probe().await {
            Ok(info) => ProbeOutcome { reachable: true, detail: format!("{info:?}") },
            Err(err) => ProbeOutcome { reachable: false, detail: err.to_string() },
        };

        let scope = scope_for(auto_sync.as_ref(), metadata_only);
        let detection = detect_changes(source_client.as_ref(), &ctx.cache, config.source_id, &scope).await?;

        Ok(TestOutcome::Diagnostic {
            source,
            destination,
            has_changes: detection.has_changes,
            metadata_changed: detection.details.metadata,
        })
    } else {
        let report = drive_tick(&ctx.store, &ctx.cache, &ctx.clients, config.id).await?;
        Ok(TestOutcome::Ran(report))
    }
}
