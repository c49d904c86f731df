//! The per-resource and per-family pipeline driver (spec.md §4.1).
//!
//! A single generic [`sync_resource`] routine is driven once per
//! [`ResourceDescriptor`](crate::resources::ResourceDescriptor) — no
//! per-resource special casing beyond the descriptor table itself.

use std::collections::BTreeSet;

use his_sync_client::{ClientError, Dhis2Client, ImportCounts, ImportStrategy, MergeMode, MetadataQuery};
use his_sync_store::Job;
use serde_json::Value;

use crate::error::MetadataResult;
use crate::families::Family;
use crate::resources::{all_descriptors, resources_in_order, ResourceDescriptor, Sanitizer};
use crate::sanitize::{sanitize_sharing, sanitize_user_roles, sanitize_visualization_refs, DestinationDirectory, SanitizeReport};

/// Outcome of syncing one resource, used both for the Job log line and
/// for family/job-level rollup (spec.md §4.1, "Result aggregation").
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub resource: &'static str,
    pub source_count: u64,
    pub counts: ImportCounts,
    pub sanitize: SanitizeReport,
    /// `true` when the source returned 404 — an empty success, not an
    /// error (spec.md §4.1, "Failure policy").
    pub not_supported: bool,
}

impl ResourceOutcome {
    /// `✓ <resource>: Source=<n> | Created=<c>, Updated=<u> | Ignored=<i> | Errors=<e>, Warnings=<w>`
    /// (spec.md §4.1, verbatim format).
    pub fn log_line(&self) -> String {
        format!(
            "✓ {}: Source={} | Created={}, Updated={} | Ignored={} | Errors={}, Warnings={}",
            self.resource, self.source_count, self.counts.created, self.counts.updated, self.counts.ignored, self.counts.errors, self.counts.warnings
        )
    }
}

/// Configuration the pipeline needs beyond the two clients.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub import_strategy: ImportStrategy,
    pub merge_mode: MergeMode,
    pub page_size: u32,
}

/// Fetches the destination's current users/userGroups/userRoles once per
/// run, used by every resource's sanitizer (spec.md §4.1).
pub async fn load_destination_directory(destination: &dyn Dhis2Client) -> MetadataResult<DestinationDirectory> {
    let users = destination
        .get_metadata("users", &MetadataQuery { fields: "id".into(), filter: None, page_size: 1000 })
        .await?;
    let user_groups = destination
        .get_metadata("userGroups", &MetadataQuery { fields: "id".into(), filter: None, page_size: 1000 })
        .await?;
    let roles = destination
        .get_metadata("userRoles", &MetadataQuery { fields: "id,name".into(), filter: None, page_size: 1000 })
        .await?;

    Ok(DestinationDirectory {
        user_ids: extract_ids(&users),
        user_group_ids: extract_ids(&user_groups),
        role_ids: extract_ids(&roles),
        roles: roles
            .iter()
            .filter_map(|r| {
                let id = r.get("id").and_then(Value::as_str)?;
                let name = r.get("name").and_then(Value::as_str).unwrap_or_default();
                Some((id.to_string(), name.to_string()))
            })
            .collect(),
    })
}

fn extract_ids(objects: &[Value]) -> BTreeSet<String> {
    objects
        .iter()
        .filter_map(|o| o.get("id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn apply_sanitizers(descriptor: &ResourceDescriptor, object: &mut Value, directory: &DestinationDirectory) -> SanitizeReport {
    let mut report = SanitizeReport::default();
    for sanitizer in descriptor.sanitizers {
        match sanitizer {
            Sanitizer::Sharing => report.merge(sanitize_sharing(object, directory)),
            Sanitizer::UserRoles => report.merge(sanitize_user_roles(object, directory)),
            Sanitizer::VisualizationRefs => sanitize_visualization_refs(object),
        }
    }
    report
}

/// Fetches, sanitizes and posts one resource (spec.md §4.1's per-resource
/// operation). A source 404 is treated as an empty success; any other
/// client error is returned to the caller, which logs it and continues
/// with the next resource (spec.md §4.1, "Failure policy").
pub async fn sync_resource(
    source: &dyn Dhis2Client,
    destination: &dyn Dhis2Client,
    descriptor: &ResourceDescriptor,
    directory: &DestinationDirectory,
    options: PipelineOptions,
) -> MetadataResult<ResourceOutcome> {
    let query = MetadataQuery {
        fields: descriptor.fields.to_string(),
        filter: None,
        page_size: options.page_size,
    };

    let objects = match source.get_metadata(descriptor.name, &query).await {
        Ok(objects) => objects,
        Err(ClientError::ResourceNotAvailable { .. }) => {
            return Ok(ResourceOutcome {
                resource: descriptor.name,
                source_count: 0,
                counts: ImportCounts::default(),
                sanitize: SanitizeReport::default(),
                not_supported: true,
            });
        }
        Err(err) => return Err(err.into()),
    };

    let source_count = objects.len() as u64;
    let mut sanitize_total = SanitizeReport::default();
    let sanitized: Vec<Value> = objects
        .into_iter()
        .map(|mut object| {
            sanitize_total.merge(apply_sanitizers(descriptor, &mut object, directory));
            object
        })
        .collect();

    let report = destination
        .post_metadata(descriptor.name, sanitized, options.import_strategy, options.merge_mode, descriptor.skip_sharing)
        .await?;

    Ok(ResourceOutcome {
        resource: descriptor.name,
        source_count,
        counts: report.counts(),
        sanitize: sanitize_total,
        not_supported: false,
    })
}

/// Drives every resource in every requested family, in the fixed order
/// spec.md §4.1 establishes, writing a log line and updating `job`'s
/// counters as each resource finishes. Per-resource errors are logged and
/// counted but never abort the pipeline (spec.md §4.1, "Failure policy").
pub async fn run_families(
    source: &dyn Dhis2Client,
    destination: &dyn Dhis2Client,
    families: &[Family],
    options: PipelineOptions,
    job: &mut Job,
) -> MetadataResult<Vec<ResourceOutcome>> {
    let directory = load_destination_directory(destination).await?;
    let resources = resources_in_order(families);
    let mut outcomes = Vec::with_capacity(resources.len());

    for descriptor in &resources {
        match sync_resource(source, destination, descriptor, &directory, options).await {
            Ok(outcome) => {
                job.log_line(outcome.log_line());
                if outcome.sanitize.users_removed > 0 || outcome.sanitize.user_groups_removed > 0 {
                    job.log_line(outcome.sanitize.describe());
                }
                job.success_count += outcome.counts.created + outcome.counts.updated;
                job.error_count += outcome.counts.errors;
                job.warning_count += outcome.counts.warnings;
                job.set_progress(job.processed_items + outcome.source_count, job.total_items + outcome.source_count);
                tracing::info!(resource = descriptor.name, %outcome.source_count, "metadata resource synced");
                outcomes.push(outcome);
            }
            Err(err) => {
                tracing::warn!(resource = descriptor.name, error = %err, "metadata resource failed, continuing");
                job.error_count += 1;
                job.log_line(format!("✗ {}: {}", descriptor.name, err));
            }
        }
    }

    Ok(outcomes)
}

/// Returns every known resource name, for building include/exclude lists
/// in [`his_sync_store::AutoSyncSettings`].
pub fn known_resource_names() -> Vec<&'static str> {
    all_descriptors().into_iter().map(|d| d.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use his_sync_client::{AggregateQuery, EventQuery, ImportReport, SystemInfo, TrackerBundle, TrackerImportReport, TrackerQuery};
    use std::sync::Mutex;

    /// In-memory fake implementing [`Dhis2Client`], per SPEC_FULL.md §8's
    /// trait-seamed testing approach.
    struct FakeClient {
        metadata: std::collections::HashMap<&'static str, Vec<Value>>,
        posted: Mutex<Vec<(String, Vec<Value>)>>,
    }

    #[async_trait]
    impl Dhis2Client for FakeClient {
        async fn probe(&self) -> his_sync_client::ClientResult<SystemInfo> {
            Ok(SystemInfo { version: Some("2.38".into()), server_date: None })
        }

        async fn get_metadata(&self, resource: &str, _query: &MetadataQuery) -> his_sync_client::ClientResult<Vec<Value>> {
            Ok(self.metadata.get(resource).cloned().unwrap_or_default())
        }

        async fn post_metadata(
            &self,
            resource: &str,
            objects: Vec<Value>,
            _strategy: ImportStrategy,
            _merge_mode: MergeMode,
            _skip_sharing: bool,
        ) -> his_sync_client::ClientResult<ImportReport> {
            let n = objects.len() as u64;
            self.posted.lock().unwrap().push((resource.to_string(), objects));
            Ok(ImportReport::Modern {
                counts: ImportCounts { created: n, updated: 0, ignored: 0, deleted: 0, errors: 0, warnings: 0 },
                conflicts: vec![],
            })
        }

        async fn count_changed_since(&self, _resource: &str, _since_iso: &str) -> his_sync_client::ClientResult<u64> {
            Ok(0)
        }

        async fn get_aggregate_values(&self, _query: &AggregateQuery) -> his_sync_client::ClientResult<Vec<Value>> {
            Ok(vec![])
        }

        async fn post_aggregate_values(&self, _values: Vec<Value>) -> his_sync_client::ClientResult<ImportReport> {
            unimplemented!()
        }

        async fn get_events(&self, _query: &EventQuery) -> his_sync_client::ClientResult<Vec<Value>> {
            Ok(vec![])
        }

        async fn post_events(&self, _events: Vec<Value>) -> his_sync_client::ClientResult<ImportReport> {
            unimplemented!()
        }

        async fn get_tracked_entities(&self, _query: &TrackerQuery) -> his_sync_client::ClientResult<Vec<Value>> {
            Ok(vec![])
        }

        async fn post_tracker_bundle(&self, _bundle: &TrackerBundle) -> his_sync_client::ClientResult<TrackerImportReport> {
            unimplemented!()
        }

        async fn post_tracker_legacy(&self, _bundle: &TrackerBundle) -> his_sync_client::ClientResult<TrackerImportReport> {
            unimplemented!()
        }

        async fn get_data_value_audit_count(&self, _since_iso: &str) -> his_sync_client::ClientResult<Option<u64>> {
            Ok(None)
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions { import_strategy: ImportStrategy::CreateAndUpdate, merge_mode: MergeMode::Merge, page_size: 50 }
    }

    #[tokio::test]
    async fn empty_source_produces_zero_log_line() {
        let source = FakeClient { metadata: Default::default(), posted: Mutex::new(vec![]) };
        let destination = FakeClient { metadata: Default::default(), posted: Mutex::new(vec![]) };
        let directory = load_destination_directory(&destination).await.unwrap();
        let descriptor = all_descriptors().into_iter().find(|d| d.name == "userRoles").unwrap();
        let outcome = sync_resource(&source, &destination, &descriptor, &directory, options()).await.unwrap();
        assert_eq!(outcome.log_line(), "✓ userRoles: Source=0 | Created=0, Updated=0 | Ignored=0 | Errors=0, Warnings=0");
    }

    #[tokio::test]
    async fn single_family_scenario_matches_spec_example() {
        let mut source_meta = std::collections::HashMap::new();
        source_meta.insert("userRoles", vec![serde_json::json!({"id": "r1"}), serde_json::json!({"id": "r2"})]);
        source_meta.insert(
            "users",
            vec![
                serde_json::json!({"id": "u1", "userRoles": [{"id": "r1"}]}),
                serde_json::json!({"id": "u2", "userRoles": [{"id": "r1"}]}),
                serde_json::json!({"id": "u3", "userRoles": [{"id": "r1"}]}),
            ],
        );
        source_meta.insert("userGroups", vec![serde_json::json!({"id": "g1"})]);

        let source = FakeClient { metadata: source_meta, posted: Mutex::new(vec![]) };
        let destination = FakeClient { metadata: Default::default(), posted: Mutex::new(vec![]) };

        let mut job = Job::new(uuid::Uuid::new_v4(), his_sync_store::JobType::Metadata);
        let outcomes = run_families(&source, &destination, &[Family::Users], options(), &mut job).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(job.log.contains("✓ userRoles: Source=2 | Created=2, Updated=0"));
        assert!(job.log.contains("✓ users: Source=3 | Created=3, Updated=0"));
        assert!(job.log.contains("✓ userGroups: Source=1 | Created=1, Updated=0"));
    }
}
