//! Source-side change detection (spec.md §4.5).
//!
//! For each monitored resource, issues `filter=lastUpdated:gt:<watermark>`
//! with `pageSize=1` and reads the pager's `total`. A positive total means
//! "changed since watermark". The watermark itself is advanced only after
//! a successful sync, by `his_sync_lifecycle::record_success` — this
//! crate only reads watermarks, it never writes them.

mod error;

pub use error::{DetectorError, DetectorResult};

use chrono::{DateTime, Utc};
use his_sync_client::Dhis2Client;
use his_sync_store::{ChangeCategory, InstanceId, ReplicationCache};

/// `has_changes` / `count` for one data category (spec.md §4.5's output
/// shape, `aggregate`/`events`/`tracker` sub-objects).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryChange {
    pub has_changes: bool,
    pub count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeDetails {
    pub metadata: Vec<String>,
    pub aggregate: CategoryChange,
    pub events: CategoryChange,
    pub tracker: CategoryChange,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub has_changes: bool,
    pub metadata_changes: bool,
    pub data_changes: bool,
    pub details: ChangeDetails,
}

/// What to monitor for one detection pass (spec.md §3, `AutoSyncSettings`
/// projected onto the detector).
#[derive(Debug, Clone, Default)]
pub struct MonitorScope {
    pub metadata_resources: Vec<String>,
    pub monitor_data: bool,
}

const EPOCH: &str = "1970-01-01T00:00:00Z";

fn watermark_iso(cache: &ReplicationCache, instance_id: InstanceId, category: ChangeCategory, resource: &str) -> String {
    cache
        .get_watermark(instance_id, category, resource)
        .map(|dt: DateTime<Utc>| dt.to_rfc3339())
        .unwrap_or_else(|| EPOCH.to_string())
}

/// Queries each monitored metadata resource's `lastUpdated` count against
/// its cached watermark, returning the resources that changed.
pub async fn detect_metadata_changes(
    client: &dyn Dhis2Client,
    cache: &ReplicationCache,
    instance_id: InstanceId,
    resources: &[String],
) -> DetectorResult<Vec<String>> {
    let mut changed = Vec::new();
    for resource in resources {
        let since = watermark_iso(cache, instance_id, ChangeCategory::Metadata, resource);
        let count = client.count_changed_since(resource, &since).await?;
        if count > 0 {
            changed.push(resource.clone());
        }
    }
    Ok(changed)
}

/// Aggregate change detection: prefers the dedicated audit endpoint;
/// falls back to a conservative "changed" report when unavailable,
/// remembering the probe's outcome so subsequent ticks don't re-probe
/// (SPEC_FULL.md §9, design note 1 — resolves spec.md §9's open question).
pub async fn detect_aggregate_changes(
    client: &dyn Dhis2Client,
    cache: &ReplicationCache,
    instance_id: InstanceId,
) -> DetectorResult<CategoryChange> {
    let since = watermark_iso(cache, instance_id, ChangeCategory::Data, "dataValueAudits");

    if cache.get_audit_supported(instance_id) == Some(false) {
        return Ok(CategoryChange { has_changes: true, count: 0 });
    }

    match client.get_data_value_audit_count(&since).await? {
        Some(count) => {
            cache.set_audit_supported(instance_id, true);
            Ok(CategoryChange { has_changes: count > 0, count })
        }
        None => {
            cache.set_audit_supported(instance_id, false);
            tracing::warn!(%instance_id, "no dataValueAudits endpoint; conservatively reporting changes");
            Ok(CategoryChange { has_changes: true, count: 0 })
        }
    }
}

/// Events/tracker change detection via `lastUpdatedStartDate` semantics,
/// implemented with the same `count_changed_since` probe the metadata
/// path uses (spec.md §4.5: "for events and tracker, it uses
/// `lastUpdatedStartDate`" — the generic `lastUpdated:gt:` filter the
/// client issues is equivalent for a changed-count probe).
async fn detect_resource_changes(
    client: &dyn Dhis2Client,
    cache: &ReplicationCache,
    instance_id: InstanceId,
    resource: &str,
) -> DetectorResult<CategoryChange> {
    let since = watermark_iso(cache, instance_id, ChangeCategory::Data, resource);
    let count = client.count_changed_since(resource, &since).await?;
    Ok(CategoryChange { has_changes: count > 0, count })
}

/// Runs one full detection pass over the configured scope, producing the
/// output shape of spec.md §4.5.
pub async fn detect_changes(
    client: &dyn Dhis2Client,
    cache: &ReplicationCache,
    instance_id: InstanceId,
    scope: &MonitorScope,
) -> DetectorResult<DetectionResult> {
    let mut details = ChangeDetails::default();

    if !scope.metadata_resources.is_empty() {
        details.metadata = detect_metadata_changes(client, cache, instance_id, &scope.metadata_resources).await?;
    }

    if scope.monitor_data {
        details.aggregate = detect_aggregate_changes(client, cache, instance_id).await?;
        details.events = detect_resource_changes(client, cache, instance_id, "events").await?;
        details.tracker = detect_resource_changes(client, cache, instance_id, "trackedEntityInstances").await?;
    }

    let metadata_changes = !details.metadata.is_empty();
    let data_changes = details.aggregate.has_changes || details.events.has_changes || details.tracker.has_changes;

    Ok(DetectionResult {
        has_changes: metadata_changes || data_changes,
        metadata_changes,
        data_changes,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use his_sync_client::{
        AggregateQuery, ClientResult, EventQuery, ImportReport, MetadataQuery, SystemInfo, TrackerBundle,
        TrackerImportReport, TrackerQuery,
    };
    use serde_json::Value;
    use std::sync::atomic::{AtomicU64, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeClient {
        changed_count: AtomicU64,
        audit_count: Option<u64>,
    }

    #[async_trait]
    impl Dhis2Client for FakeClient {
        async fn probe(&self) -> ClientResult<SystemInfo> {
            Ok(SystemInfo { version: None, server_date: None })
        }
        async fn get_metadata(&self, _resource: &str, _query: &MetadataQuery) -> ClientResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn post_metadata(
            &self,
            _resource: &str,
            _objects: Vec<Value>,
            _strategy: his_sync_client::ImportStrategy,
            _merge_mode: his_sync_client::MergeMode,
            _skip_sharing: bool,
        ) -> ClientResult<ImportReport> {
            unimplemented!()
        }
        async fn count_changed_since(&self, _resource: &str, _since_iso: &str) -> ClientResult<u64> {
            Ok(self.changed_count.load(Ordering::SeqCst))
        }
        async fn get_aggregate_values(&self, _query: &AggregateQuery) -> ClientResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn post_aggregate_values(&self, _values: Vec<Value>) -> ClientResult<ImportReport> {
            unimplemented!()
        }
        async fn get_events(&self, _query: &EventQuery) -> ClientResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn post_events(&self, _events: Vec<Value>) -> ClientResult<ImportReport> {
            unimplemented!()
        }
        async fn get_tracked_entities(&self, _query: &TrackerQuery) -> ClientResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn post_tracker_bundle(&self, _bundle: &TrackerBundle) -> ClientResult<TrackerImportReport> {
            unimplemented!()
        }
        async fn post_tracker_legacy(&self, _bundle: &TrackerBundle) -> ClientResult<TrackerImportReport> {
            unimplemented!()
        }
        async fn get_data_value_audit_count(&self, _since_iso: &str) -> ClientResult<Option<u64>> {
            Ok(self.audit_count)
        }
    }

    #[tokio::test]
    async fn no_changes_when_counts_are_zero() {
        let client = FakeClient { audit_count: Some(0), ..Default::default() };
        let cache = ReplicationCache::default();
        let instance = Uuid::new_v4();
        let scope = MonitorScope { metadata_resources: vec!["users".into()], monitor_data: true };
        let result = detect_changes(&client, &cache, instance, &scope).await.unwrap();
        assert!(!result.has_changes);
    }

    #[tokio::test]
    async fn metadata_resource_flagged_when_count_positive() {
        let client = FakeClient { changed_count: AtomicU64::new(2), audit_count: Some(0) };
        let cache = ReplicationCache::default();
        let instance = Uuid::new_v4();
        let scope = MonitorScope { metadata_resources: vec!["users".into()], monitor_data: false };
        let result = detect_changes(&client, &cache, instance, &scope).await.unwrap();
        assert!(result.metadata_changes);
        assert_eq!(result.details.metadata, vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn missing_audit_endpoint_falls_back_conservatively_and_is_cached() {
        let client = FakeClient { audit_count: None, ..Default::default() };
        let cache = ReplicationCache::default();
        let instance = Uuid::new_v4();
        let change = detect_aggregate_changes(&client, &cache, instance).await.unwrap();
        assert!(change.has_changes);
        assert_eq!(cache.get_audit_supported(instance), Some(false));
    }
}
