//! Per-configuration lifecycle state machine (spec.md §4.6).
//!
//! [`tick`] runs the five-step decision procedure once; the caller
//! executes the resulting [`plan::SyncPlan`] via the orchestrator and
//! reports the outcome back through [`record_success`] /
//! [`record_failure`] so the next tick sees the right state.

mod error;
pub mod plan;

pub use error::{LifecycleError, LifecycleResult};
pub use plan::{full_plan, incremental_plan, Phase, SyncPlan, PHASE_ORDER};

use std::time::Duration;

use chrono::{DateTime, Utc};
use his_sync_client::Dhis2Client;
use his_sync_detector::{detect_changes, DetectionResult, MonitorScope};
use his_sync_store::{AutoSyncSettings, ChangeCategory, ConfigId, InstanceId, LifecycleState, ReplicationCache, SyncConfiguration};

/// Data-category resources the detector probes with `lastUpdatedStartDate`
/// semantics (spec.md §4.5) — advanced alongside the monitored metadata
/// resources on a successful sync.
const DATA_WATERMARK_RESOURCES: [&str; 3] = ["dataValueAudits", "events", "trackedEntityInstances"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannotSync {
    Running,
    Cooldown { remaining_secs: u64 },
    Throttled { retry_after_secs: u64 },
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Auto-sync disabled for this configuration (spec.md §4.6 step 1).
    Disabled,
    CannotSync(CannotSync),
    /// Change detector found nothing to do (step 5, idle tick).
    NoChanges,
    /// Admitted: run `plan` and report back via [`record_success`] /
    /// [`record_failure`].
    Admitted { plan: SyncPlan, detection: DetectionResult },
}

/// Steps 1-4 of spec.md §4.6: pure, synchronous admission checks that
/// don't require talking to the source.
pub fn check_admission(
    cache: &ReplicationCache,
    config_id: ConfigId,
    auto_sync: &AutoSyncSettings,
    has_active_job: bool,
) -> Result<(), CannotSync> {
    if !auto_sync.is_enabled {
        return Err(CannotSync::Running); // unreachable path guarded by caller; see `tick`
    }
    if has_active_job {
        return Err(CannotSync::Running);
    }
    if let Some(remaining) = cache.cooldown_remaining(config_id) {
        return Err(CannotSync::Cooldown { remaining_secs: remaining.as_secs() });
    }
    if cache.rate_count(config_id) >= auto_sync.max_syncs_per_hour {
        return Err(CannotSync::Throttled { retry_after_secs: 3600 });
    }
    Ok(())
}

/// Runs the full spec.md §4.6 decision procedure for one configuration.
pub async fn tick(
    client: &dyn Dhis2Client,
    cache: &ReplicationCache,
    config: &SyncConfiguration,
    auto_sync: &AutoSyncSettings,
    has_active_job: bool,
    monitor_scope: &MonitorScope,
) -> LifecycleResult<TickOutcome> {
    if !auto_sync.is_enabled {
        return Ok(TickOutcome::Disabled);
    }
    if has_active_job {
        return Ok(TickOutcome::CannotSync(CannotSync::Running));
    }
    if let Some(remaining) = cache.cooldown_remaining(config.id) {
        return Ok(TickOutcome::CannotSync(CannotSync::Cooldown { remaining_secs: remaining.as_secs() }));
    }
    if cache.rate_count(config.id) >= auto_sync.max_syncs_per_hour {
        return Ok(TickOutcome::CannotSync(CannotSync::Throttled { retry_after_secs: 3600 }));
    }

    let detection = detect_changes(client, cache, config.source_id, monitor_scope).await?;
    if !detection.has_changes {
        return Ok(TickOutcome::NoChanges);
    }

    let state = cache.lifecycle_state(config.id);
    let plan = if state == LifecycleState::Initial {
        full_plan(config.sync_type)
    } else {
        incremental_plan(config.sync_type, &detection)
    };

    // Rate counter is incremented at admission, not completion, so
    // in-flight syncs count against the limit (spec.md §5).
    cache.record_admission(config.id);
    cache.set_lifecycle_state(config.id, LifecycleState::Running);

    Ok(TickOutcome::Admitted { plan, detection })
}

/// Records a successful sync: clears any cooldown, leaves the
/// configuration in `METADATA_DONE`, and advances the source watermark
/// for every resource the detector monitored (spec.md §4.5 "the
/// watermark is advanced only after a successful sync completes" and
/// §4.6 step 6). `watermark` is the sync's start time, per spec.md §4.5.
pub fn record_success(
    cache: &ReplicationCache,
    config_id: ConfigId,
    instance_id: InstanceId,
    scope: &MonitorScope,
    watermark: DateTime<Utc>,
) {
    cache.clear_cooldown(config_id);
    cache.set_lifecycle_state(config_id, LifecycleState::MetadataDone);

    for resource in &scope.metadata_resources {
        cache.set_watermark(instance_id, ChangeCategory::Metadata, resource, watermark);
    }
    if scope.monitor_data {
        for resource in DATA_WATERMARK_RESOURCES {
            cache.set_watermark(instance_id, ChangeCategory::Data, resource, watermark);
        }
    }
}

/// Records a failed sync: arms a cooldown of `cooldown_after_error`
/// seconds (spec.md §4.6 step 6 / §4.6's INITIAL-metadata-failure case).
pub fn record_failure(cache: &ReplicationCache, config_id: ConfigId, cooldown_after_error_secs: u64) {
    cache.arm_cooldown(config_id, Duration::from_secs(cooldown_after_error_secs));
    cache.set_lifecycle_state(config_id, LifecycleState::Cooldown);
}

#[cfg(test)]
mod tests {
    use super::*;
    use his_sync_store::{ExecutionMode, ImportStrategyKind, MergeModeKind, SyncType};
    use uuid::Uuid;

    fn config() -> SyncConfiguration {
        SyncConfiguration::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SyncType::Metadata,
            ImportStrategyKind::CreateAndUpdate,
            MergeModeKind::Merge,
            ExecutionMode::Automatic,
            50,
            None,
            None,
        )
        .unwrap()
    }

    fn settings(config_id: ConfigId, max_per_hour: u32) -> AutoSyncSettings {
        let mut s = AutoSyncSettings::new(config_id, 60).unwrap();
        s.max_syncs_per_hour = max_per_hour;
        s
    }

    #[test]
    fn disabled_auto_sync_blocks_before_any_cache_check() {
        let cache = ReplicationCache::default();
        let config = config();
        let mut s = settings(config.id, 10);
        s.is_enabled = false;
        assert!(check_admission(&cache, config.id, &s, false).is_err());
    }

    #[test]
    fn active_job_blocks_admission() {
        let cache = ReplicationCache::default();
        let config = config();
        let s = settings(config.id, 10);
        assert_eq!(check_admission(&cache, config.id, &s, true), Err(CannotSync::Running));
    }

    #[test]
    fn throttled_after_max_syncs_per_hour_reached() {
        let cache = ReplicationCache::default();
        let config = config();
        let s = settings(config.id, 1);
        cache.record_admission(config.id);
        assert_eq!(
            check_admission(&cache, config.id, &s, false),
            Err(CannotSync::Throttled { retry_after_secs: 3600 })
        );
    }

    #[test]
    fn cooldown_blocks_until_it_expires() {
        let cache = ReplicationCache::default();
        let config = config();
        let s = settings(config.id, 10);
        cache.arm_cooldown(config.id, Duration::from_secs(60));
        assert!(matches!(
            check_admission(&cache, config.id, &s, false),
            Err(CannotSync::Cooldown { .. })
        ));
    }

    #[test]
    fn record_failure_then_success_clears_cooldown() {
        let cache = ReplicationCache::default();
        let config_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let scope = MonitorScope { metadata_resources: vec![], monitor_data: false };
        record_failure(&cache, config_id, 60);
        assert!(cache.cooldown_remaining(config_id).is_some());
        record_success(&cache, config_id, instance_id, &scope, Utc::now());
        assert!(cache.cooldown_remaining(config_id).is_none());
        assert_eq!(cache.lifecycle_state(config_id), LifecycleState::MetadataDone);
    }

    #[test]
    fn record_success_advances_watermarks_for_monitored_resources() {
        let cache = ReplicationCache::default();
        let config_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let scope = MonitorScope { metadata_resources: vec!["users".to_string()], monitor_data: true };

        assert_eq!(cache.get_watermark(instance_id, ChangeCategory::Metadata, "users"), None);
        assert_eq!(cache.get_watermark(instance_id, ChangeCategory::Data, "events"), None);

        let now = Utc::now();
        record_success(&cache, config_id, instance_id, &scope, now);

        assert_eq!(cache.get_watermark(instance_id, ChangeCategory::Metadata, "users"), Some(now));
        assert_eq!(cache.get_watermark(instance_id, ChangeCategory::Data, "events"), Some(now));
        assert_eq!(cache.get_watermark(instance_id, ChangeCategory::Data, "trackedEntityInstances"), Some(now));
        assert_eq!(cache.get_watermark(instance_id, ChangeCategory::Data, "dataValueAudits"), Some(now));
    }
}
