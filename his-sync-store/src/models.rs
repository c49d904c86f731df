use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub type InstanceId = Uuid;
pub type ConfigId = Uuid;
pub type JobId = Uuid;

/// spec.md §3 — a named, addressable HIS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub server_version: Option<String>,
    pub is_source: bool,
    pub is_destination: bool,
    pub last_reachable: Option<bool>,
    pub last_reachable_at: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        is_source: bool,
        is_destination: bool,
    ) -> StoreResult<Self> {
        if !is_source && !is_destination {
            return Err(StoreError::Validation(
                "an instance must be usable as a source, a destination, or both".into(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url: his_sync_client::canonicalize_base_url(&base_url.into()),
            username: username.into(),
            password: password.into(),
            server_version: None,
            is_source,
            is_destination,
            last_reachable: None,
            last_reachable_at: None,
        })
    }

    pub fn record_probe(&mut self, reachable: bool, server_version: Option<String>) {
        self.last_reachable = Some(reachable);
        self.last_reachable_at = Some(Utc::now());
        if reachable {
            if let Some(version) = server_version {
                self.server_version = Some(version);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    Metadata,
    AggregateData,
    Events,
    Tracker,
    AggregateMetadata,
    AllData,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStrategyKind {
    CreateOnly,
    UpdateOnly,
    CreateAndUpdate,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeModeKind {
    Replace,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Manual,
    Scheduled,
    Automatic,
}

/// spec.md §3 — a directed pairing (source → destination).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfiguration {
    pub id: ConfigId,
    pub source_id: InstanceId,
    pub destination_id: InstanceId,
    pub sync_type: SyncType,
    pub import_strategy: ImportStrategyKind,
    pub merge_mode: MergeModeKind,
    pub execution_mode: ExecutionMode,
    pub page_size: u32,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub active: bool,
}

impl SyncConfiguration {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: InstanceId,
        destination_id: InstanceId,
        sync_type: SyncType,
        import_strategy: ImportStrategyKind,
        merge_mode: MergeModeKind,
        execution_mode: ExecutionMode,
        page_size: u32,
        date_start: Option<DateTime<Utc>>,
        date_end: Option<DateTime<Utc>>,
    ) -> StoreResult<Self> {
        if source_id == destination_id {
            return Err(StoreError::Validation("source and destination must differ".into()));
        }
        if !(1..=1000).contains(&page_size) {
            return Err(StoreError::Validation(format!(
                "page_size must be in [1, 1000], got {page_size}"
            )));
        }
        if let (Some(start), Some(end)) = (date_start, date_end) {
            if start > end {
                return Err(StoreError::Validation("date_start must be <= date_end".into()));
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            source_id,
            destination_id,
            sync_type,
            import_strategy,
            merge_mode,
            execution_mode,
            page_size,
            date_start,
            date_end,
            active: true,
        })
    }

    pub fn requires_scheduling(&self) -> bool {
        matches!(self.execution_mode, ExecutionMode::Scheduled | ExecutionMode::Automatic)
    }
}

/// spec.md §3 — one per configuration, optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSyncSettings {
    pub config_id: ConfigId,
    pub is_enabled: bool,
    pub check_interval_secs: u64,
    pub delay_before_sync_secs: u64,
    pub monitor_metadata: bool,
    pub monitor_data: bool,
    pub include_resources: Option<Vec<String>>,
    pub exclude_resources: Option<Vec<String>>,
    pub max_syncs_per_hour: u32,
    pub cooldown_after_error_secs: u64,
}

impl AutoSyncSettings {
    pub fn new(config_id: ConfigId, check_interval_secs: u64) -> StoreResult<Self> {
        if check_interval_secs < 60 {
            return Err(StoreError::Validation("check_interval must be >= 60 seconds".into()));
        }
        Ok(Self {
            config_id,
            is_enabled: true,
            check_interval_secs,
            delay_before_sync_secs: 0,
            monitor_metadata: true,
            monitor_data: true,
            include_resources: None,
            exclude_resources: None,
            max_syncs_per_hour: 10,
            cooldown_after_error_secs: 300,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    Complete,
    Metadata,
    Data,
    Aggregate,
    Events,
    Tracker,
    AllData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    CompletedWithWarnings,
    Failed,
    Cancelled,
    Retrying,
    FailedPermanently,
}

/// spec.md §3 — one attempted execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub config_id: ConfigId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub total_items: u64,
    pub processed_items: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub warning_count: u64,
    pub log: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub parent_job_id: Option<JobId>,
    pub is_retry: bool,
}

impl Job {
    pub fn new(config_id: ConfigId, job_type: JobType) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_id,
            job_type,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            total_items: 0,
            processed_items: 0,
            success_count: 0,
            error_count: 0,
            warning_count: 0,
            log: String::new(),
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            next_retry_at: None,
            parent_job_id: None,
            is_retry: false,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Appends one line to the append-only job log (spec.md §7).
    pub fn log_line(&mut self, line: impl AsRef<str>) {
        if !self.log.is_empty() {
            self.log.push('\n');
        }
        self.log.push_str(line.as_ref());
    }

    pub fn set_progress(&mut self, processed: u64, total: u64) {
        self.processed_items = processed;
        if total > 0 {
            self.total_items = total;
            let pct = ((processed as f64 / total as f64) * 100.0).round() as i64;
            self.progress = pct.clamp(0, 100) as u8;
        }
    }

    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Retry eligibility per spec.md §4.4: failed, under the retry cap,
    /// and not itself a retry child.
    pub fn eligible_for_retry(&self) -> bool {
        matches!(self.status, JobStatus::Failed) && self.retry_count < self.max_retries && !self.is_retry
    }
}

/// `60 * 2^retry_count` seconds, capped at 3600s (spec.md §4.4, §9 — a
/// pure function so it can be unit-tested in isolation).
pub fn retry_backoff_secs(retry_count: u32) -> u64 {
    let backoff = 60u64.saturating_mul(1u64 << retry_count.min(10));
    backoff.min(3600)
}

/// spec.md §6 — per-configuration selection of one external metadata
/// object, with an import-order hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dhis2Entity {
    pub config_id: ConfigId,
    pub entity_type: String,
    pub external_id: String,
    pub import_order: u32,
}

/// spec.md §6 — per-version record of which fields were requested for a
/// resource, used to track schema drift across server versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dhis2EntityVersion {
    pub version: String,
    pub entity_type: String,
    pub fields: String,
}

/// spec.md §6 — per-program choice of which date attribute feeds the
/// tracker pipeline's `lastUpdated` filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateFilterAttribute {
    pub config_id: ConfigId,
    pub program_id: String,
    pub attribute: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_grows_then_caps() {
        assert_eq!(retry_backoff_secs(0), 60);
        assert_eq!(retry_backoff_secs(1), 120);
        assert_eq!(retry_backoff_secs(2), 240);
        assert_eq!(retry_backoff_secs(6), 3600);
        assert_eq!(retry_backoff_secs(20), 3600);
    }

    #[test]
    fn sync_configuration_rejects_equal_source_and_destination() {
        let id = Uuid::new_v4();
        let err = SyncConfiguration::new(
            id,
            id,
            SyncType::Metadata,
            ImportStrategyKind::CreateAndUpdate,
            MergeModeKind::Merge,
            ExecutionMode::Manual,
            50,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn sync_configuration_rejects_bad_page_size() {
        let err = SyncConfiguration::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SyncType::Metadata,
            ImportStrategyKind::CreateAndUpdate,
            MergeModeKind::Merge,
            ExecutionMode::Manual,
            0,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = SyncConfiguration::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SyncType::Metadata,
            ImportStrategyKind::CreateAndUpdate,
            MergeModeKind::Merge,
            ExecutionMode::Manual,
            1001,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn job_progress_is_clamped_and_monotonic_capable() {
        let mut job = Job::new(Uuid::new_v4(), JobType::Metadata);
        job.set_progress(0, 100);
        assert_eq!(job.progress, 0);
        job.set_progress(50, 100);
        assert_eq!(job.progress, 50);
        job.set_progress(100, 100);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn retry_eligibility_requires_failed_and_not_retry_child() {
        let mut job = Job::new(Uuid::new_v4(), JobType::Metadata);
        job.status = JobStatus::Failed;
        assert!(job.eligible_for_retry());
        job.is_retry = true;
        assert!(!job.eligible_for_retry());
        job.is_retry = false;
        job.retry_count = job.max_retries;
        assert!(!job.eligible_for_retry());
    }
}
