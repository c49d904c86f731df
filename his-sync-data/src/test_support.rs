//! In-memory [`Dhis2Client`] fake shared by this crate's unit tests
//! (SPEC_FULL.md §8's trait-seamed testing approach).

use std::sync::Mutex;

use async_trait::async_trait;
use his_sync_client::{
    AggregateQuery, ClientResult, Dhis2Client, EventQuery, ImportCounts, ImportReport, ImportStrategy, MergeMode,
    MetadataQuery, SystemInfo, TrackerBundle, TrackerImportReport, TrackerQuery,
};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Default)]
pub struct PostCounts {
    pub aggregate: u32,
    pub events: u32,
}

#[derive(Default)]
pub struct FakeClient {
    metadata: HashMap<&'static str, Vec<Value>>,
    aggregate_values: Vec<Value>,
    events_by_program: HashMap<String, Vec<Value>>,
    posts: Mutex<PostCounts>,
}

impl FakeClient {
    pub fn with_aggregate_values(values: Vec<Value>) -> Self {
        Self { aggregate_values: values, ..Default::default() }
    }

    pub fn with_events(program: &str, events: Vec<Value>) -> Self {
        let mut map = HashMap::new();
        map.insert(program.to_string(), events);
        Self { events_by_program: map, ..Default::default() }
    }

    pub fn post_counts(&self) -> std::sync::MutexGuard<'_, PostCounts> {
        self.posts.lock().unwrap()
    }
}

#[async_trait]
impl Dhis2Client for FakeClient {
    async fn probe(&self) -> ClientResult<SystemInfo> {
        Ok(SystemInfo { version: Some("2.38".into()), server_date: None })
    }

    async fn get_metadata(&self, resource: &str, _query: &MetadataQuery) -> ClientResult<Vec<Value>> {
        Ok(self.metadata.get(resource).cloned().unwrap_or_default())
    }

    async fn post_metadata(
        &self,
        _resource: &str,
        _objects: Vec<Value>,
        _strategy: ImportStrategy,
        _merge_mode: MergeMode,
        _skip_sharing: bool,
    ) -> ClientResult<ImportReport> {
        unimplemented!("not exercised by data-pipeline tests")
    }

    async fn count_changed_since(&self, _resource: &str, _since_iso: &str) -> ClientResult<u64> {
        Ok(0)
    }

    async fn get_aggregate_values(&self, _query: &AggregateQuery) -> ClientResult<Vec<Value>> {
        Ok(self.aggregate_values.clone())
    }

    async fn post_aggregate_values(&self, values: Vec<Value>) -> ClientResult<ImportReport> {
        self.posts.lock().unwrap().aggregate += 1;
        let n = values.len() as u64;
        Ok(ImportReport::Modern {
            counts: ImportCounts { created: n, updated: 0, ignored: 0, deleted: 0, errors: 0, warnings: 0 },
            conflicts: vec![],
        })
    }

    async fn get_events(&self, query: &EventQuery) -> ClientResult<Vec<Value>> {
        Ok(self.events_by_program.get(&query.program).cloned().unwrap_or_default())
    }

    async fn post_events(&self, events: Vec<Value>) -> ClientResult<ImportReport> {
        self.posts.lock().unwrap().events += 1;
        let n = events.len() as u64;
        Ok(ImportReport::Modern {
            counts: ImportCounts { created: n, updated: 0, ignored: 0, deleted: 0, errors: 0, warnings: 0 },
            conflicts: vec![],
        })
    }

    async fn get_tracked_entities(&self, _query: &TrackerQuery) -> ClientResult<Vec<Value>> {
        Ok(vec![])
    }

    async fn post_tracker_bundle(&self, _bundle: &TrackerBundle) -> ClientResult<TrackerImportReport> {
        unimplemented!("not exercised by aggregate/event tests")
    }

    async fn post_tracker_legacy(&self, _bundle: &TrackerBundle) -> ClientResult<TrackerImportReport> {
        unimplemented!("not exercised by aggregate/event tests")
    }

    async fn get_data_value_audit_count(&self, _since_iso: &str) -> ClientResult<Option<u64>> {
        Ok(None)
    }
}
