//! Sled-backed persistence for the durable entities in spec.md §3.
//!
//! One tree per entity kind, keyed by UUID (serialized via its hyphenated
//! string form). Secondary lookups (e.g. `Instance.name -> id`) live in
//! their own trees so the uniqueness check is a single `compare_and_swap`.

use std::path::Path;

use chrono::Utc;
use sled::{Db, Tree};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AutoSyncSettings, ConfigId, DateFilterAttribute, Dhis2Entity, Dhis2EntityVersion, Instance,
    InstanceId, Job, JobId, JobStatus, SyncConfiguration,
};

/// Owns every durable tree. Cloning a `Store` is cheap (sled's `Db` and
/// `Tree` are already `Arc`-backed handles).
#[derive(Clone)]
pub struct Store {
    db: Db,
    instances: Tree,
    instance_names: Tree,
    configurations: Tree,
    auto_sync: Tree,
    jobs: Tree,
    jobs_by_config: Tree,
    entities: Tree,
    entity_versions: Tree,
    date_filter_attrs: Tree,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            instances: db.open_tree("instances")?,
            instance_names: db.open_tree("instance_names")?,
            configurations: db.open_tree("configurations")?,
            auto_sync: db.open_tree("auto_sync")?,
            jobs: db.open_tree("jobs")?,
            jobs_by_config: db.open_tree("jobs_by_config")?,
            entities: db.open_tree("dhis2_entities")?,
            entity_versions: db.open_tree("dhis2_entity_versions")?,
            date_filter_attrs: db.open_tree("date_filter_attributes")?,
            db,
        })
    }

    /// Opens an ephemeral in-memory store, for tests and dry runs.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            instances: db.open_tree("instances")?,
            instance_names: db.open_tree("instance_names")?,
            configurations: db.open_tree("configurations")?,
            auto_sync: db.open_tree("auto_sync")?,
            jobs: db.open_tree("jobs")?,
            jobs_by_config: db.open_tree("jobs_by_config")?,
            entities: db.open_tree("dhis2_entities")?,
            entity_versions: db.open_tree("dhis2_entity_versions")?,
            date_filter_attrs: db.open_tree("date_filter_attributes")?,
            db,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // --- Instance (unique on name) ---

    pub fn put_instance(&self, instance: &Instance) -> StoreResult<()> {
        if let Some(existing) = self.instance_names.get(instance.name.as_bytes())? {
            let existing_id = Uuid::from_slice(&existing)
                .map_err(|_| StoreError::CorruptIndex(format!("instance_names entry for '{}'", instance.name)))?;
            if existing_id != instance.id {
                return Err(StoreError::UniqueConstraint(format!(
                    "instance name '{}' already in use",
                    instance.name
                )));
            }
        }
        let bytes = serde_json::to_vec(instance)?;
        self.instances.insert(instance.id.as_bytes(), bytes)?;
        self.instance_names.insert(instance.name.as_bytes(), instance.id.as_bytes())?;
        Ok(())
    }

    pub fn get_instance(&self, id: InstanceId) -> StoreResult<Instance> {
        self.instances
            .get(id.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("instance {id}")))
    }

    pub fn get_instance_by_name(&self, name: &str) -> StoreResult<Instance> {
        let id_bytes = self
            .instance_names
            .get(name.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("instance named '{name}'")))?;
        let id = Uuid::from_slice(&id_bytes).map_err(|_| StoreError::NotFound(format!("instance named '{name}'")))?;
        self.get_instance(id)
    }

    pub fn list_instances(&self) -> StoreResult<Vec<Instance>> {
        self.instances
            .iter()
            .values()
            .map(|v| Ok(serde_json::from_slice(&v?)?))
            .collect()
    }

    // --- SyncConfiguration ---

    pub fn put_configuration(&self, config: &SyncConfiguration) -> StoreResult<()> {
        let bytes = serde_json::to_vec(config)?;
        self.configurations.insert(config.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_configuration(&self, id: ConfigId) -> StoreResult<SyncConfiguration> {
        self.configurations
            .get(id.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("configuration {id}")))
    }

    pub fn list_configurations(&self) -> StoreResult<Vec<SyncConfiguration>> {
        self.configurations
            .iter()
            .values()
            .map(|v| Ok(serde_json::from_slice(&v?)?))
            .collect()
    }

    /// Deleting a configuration cascades to its jobs and auto-sync
    /// settings (spec.md §3 ownership).
    pub fn delete_configuration(&self, id: ConfigId) -> StoreResult<()> {
        if self.has_active_job(id)? {
            return Err(StoreError::ConfigurationBusy(id.to_string()));
        }
        self.configurations.remove(id.as_bytes())?;
        self.auto_sync.remove(id.as_bytes())?;
        for job in self.list_jobs_for_config(id)? {
            self.jobs.remove(job.id.as_bytes())?;
        }
        let prefix = job_prefix(id);
        let keys: Vec<_> = self.jobs_by_config.scan_prefix(&prefix).keys().collect::<Result<_, _>>()?;
        for key in keys {
            self.jobs_by_config.remove(key)?;
        }
        Ok(())
    }

    // --- AutoSyncSettings ---

    pub fn put_auto_sync(&self, settings: &AutoSyncSettings) -> StoreResult<()> {
        let bytes = serde_json::to_vec(settings)?;
        self.auto_sync.insert(settings.config_id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_auto_sync(&self, config_id: ConfigId) -> StoreResult<Option<AutoSyncSettings>> {
        self.auto_sync
            .get(config_id.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn list_auto_sync_enabled(&self) -> StoreResult<Vec<AutoSyncSettings>> {
        Ok(self
            .auto_sync
            .iter()
            .values()
            .map(|v| serde_json::from_slice::<AutoSyncSettings>(&v?).map_err(StoreError::from))
            .collect::<StoreResult<Vec<_>>>()?
            .into_iter()
            .filter(|s| s.is_enabled)
            .collect())
    }

    // --- Job ---

    pub fn put_job(&self, job: &Job) -> StoreResult<()> {
        let bytes = serde_json::to_vec(job)?;
        self.jobs.insert(job.id.as_bytes(), bytes)?;
        let mut key = job_prefix(job.config_id);
        key.extend_from_slice(job.id.as_bytes());
        self.jobs_by_config.insert(key, job.id.as_bytes())?;
        Ok(())
    }

    pub fn get_job(&self, id: JobId) -> StoreResult<Job> {
        self.jobs
            .get(id.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    pub fn list_jobs_for_config(&self, config_id: ConfigId) -> StoreResult<Vec<Job>> {
        let prefix = job_prefix(config_id);
        let mut jobs = Vec::new();
        for entry in self.jobs_by_config.scan_prefix(&prefix) {
            let (_, job_id_bytes) = entry?;
            let job_id = Uuid::from_slice(&job_id_bytes)
                .map_err(|_| StoreError::NotFound("malformed job index entry".into()))?;
            jobs.push(self.get_job(job_id)?);
        }
        Ok(jobs)
    }

    /// The at-most-one-PENDING-or-RUNNING-Job invariant of spec.md §4.6
    /// step 2 / §8, checked with a single scan over this configuration's
    /// jobs.
    pub fn has_active_job(&self, config_id: ConfigId) -> StoreResult<bool> {
        Ok(self
            .list_jobs_for_config(config_id)?
            .iter()
            .any(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running)))
    }

    pub fn jobs_eligible_for_retry(&self) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .values()
            .map(|v| serde_json::from_slice::<Job>(&v?).map_err(StoreError::from))
            .collect::<StoreResult<Vec<_>>>()?
            .into_iter()
            .filter(|j| {
                j.eligible_for_retry()
                    && j.next_retry_at.map(|at| at <= Utc::now()).unwrap_or(true)
            })
            .collect())
    }

    // --- Dhis2Entity / Dhis2EntityVersion / DateFilterAttribute ---

    pub fn put_entity(&self, entity: &Dhis2Entity) -> StoreResult<()> {
        let key = format!("{}:{}:{}", entity.config_id, entity.entity_type, entity.external_id);
        self.entities.insert(key.as_bytes(), serde_json::to_vec(entity)?)?;
        Ok(())
    }

    pub fn list_entities_for_config(&self, config_id: ConfigId) -> StoreResult<Vec<Dhis2Entity>> {
        let prefix = format!("{config_id}:");
        self.entities
            .scan_prefix(prefix.as_bytes())
            .values()
            .map(|v| Ok(serde_json::from_slice(&v?)?))
            .collect()
    }

    pub fn put_entity_version(&self, version: &Dhis2EntityVersion) -> StoreResult<()> {
        let key = format!("{}:{}", version.version, version.entity_type);
        self.entity_versions.insert(key.as_bytes(), serde_json::to_vec(version)?)?;
        Ok(())
    }

    pub fn get_entity_version(&self, version: &str, entity_type: &str) -> StoreResult<Option<Dhis2EntityVersion>> {
        let key = format!("{version}:{entity_type}");
        self.entity_versions
            .get(key.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn put_date_filter_attribute(&self, attr: &DateFilterAttribute) -> StoreResult<()> {
        let key = format!("{}:{}", attr.config_id, attr.program_id);
        self.date_filter_attrs.insert(key.as_bytes(), serde_json::to_vec(attr)?)?;
        Ok(())
    }

    pub fn get_date_filter_attribute(&self, config_id: ConfigId, program_id: &str) -> StoreResult<Option<DateFilterAttribute>> {
        let key = format!("{config_id}:{program_id}");
        self.date_filter_attrs
            .get(key.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(StoreError::from)
    }
}

fn job_prefix(config_id: ConfigId) -> Vec<u8> {
    let mut key = config_id.as_bytes().to_vec();
    key.push(b':');
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionMode, ImportStrategyKind, JobType, MergeModeKind, SyncType};

    fn store() -> Store {
        Store::open_temporary().unwrap()
    }

    #[test]
    fn instance_name_uniqueness_is_enforced() {
        let store = store();
        let a = Instance::new("prod", "https://a/api", "u", "p", true, false).unwrap();
        store.put_instance(&a).unwrap();
        let b = Instance::new("prod", "https://b/api", "u", "p", false, true).unwrap();
        let err = store.put_instance(&b).unwrap_err();
        assert!(matches!(err, StoreError::UniqueConstraint(_)));
    }

    #[test]
    fn configuration_with_active_job_cannot_be_deleted() {
        let store = store();
        let src = Instance::new("src", "https://a/api", "u", "p", true, false).unwrap();
        let dst = Instance::new("dst", "https://b/api", "u", "p", false, true).unwrap();
        store.put_instance(&src).unwrap();
        store.put_instance(&dst).unwrap();
        let config = SyncConfiguration::new(
            src.id,
            dst.id,
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
        let job = Job::new(config.id, JobType::Metadata);
        store.put_job(&job).unwrap();
        let err = store.delete_configuration(config.id).unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationBusy(_)));
    }

    #[test]
    fn at_most_one_active_job_per_configuration_is_observable() {
        let store = store();
        let config_id = Uuid::new_v4();
        assert!(!store.has_active_job(config_id).unwrap());
        let mut job = Job::new(config_id, JobType::Metadata);
        store.put_job(&job).unwrap();
        assert!(store.has_active_job(config_id).unwrap());
        job.finish(JobStatus::Completed);
        store.put_job(&job).unwrap();
        assert!(!store.has_active_job(config_id).unwrap());
    }
}
