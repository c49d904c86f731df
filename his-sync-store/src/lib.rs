//! Persistence and process-wide caches for the replication system.
//!
//! Durable entities (spec.md §3) live in an embedded [`sled`] database via
//! [`Store`]; ephemeral process-wide state (watermarks, rate limiting,
//! lifecycle state) lives in [`cache::ReplicationCache`].

pub mod cache;
pub mod db;
pub mod error;
pub mod models;

pub use cache::{ChangeCategory, LifecycleState, ReplicationCache};
pub use db::Store;
pub use error::{StoreError, StoreResult};
pub use models::{
    AutoSyncSettings, ConfigId, DateFilterAttribute, Dhis2Entity, Dhis2EntityVersion, ExecutionMode,
    ImportStrategyKind, Instance, InstanceId, Job, JobId, JobStatus, JobType, MergeModeKind,
    SyncConfiguration, SyncType, retry_backoff_secs,
};
