//! Process-wide singleton registry of per-configuration monitor tasks
//! (spec.md §4.7).
//!
//! [`Scheduler`] holds one [`tokio`] task per auto-sync-enabled
//! configuration behind a [`CancelToken`], matching SPEC_FULL.md §5:
//! tasks with an explicit cancellation token per configuration and a
//! join-with-deadline on stop, never signal-based cancellation. The
//! per-tick work itself — admission checks, change detection, and
//! running a Job through the orchestrator — lives in [`tick::drive_tick`]
//! so the CLI's `test-sync-system` command can drive the identical path
//! once, outside the scheduler.

mod client_registry;
mod error;
mod tick;

pub use client_registry::ClientRegistry;
pub use error::{SchedulerError, SchedulerResult};
pub use tick::{drive_tick, TickReport};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use his_sync_store::{ConfigId, ExecutionMode, ReplicationCache, Store};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// spec.md §4.7: `stop(id)` joins with a 10s deadline.
const STOP_JOIN_DEADLINE: Duration = Duration::from_secs(10);
/// spec.md §4.7: `restart(id) = stop(id); sleep 1s; start(id)`.
const RESTART_SETTLE: Duration = Duration::from_secs(1);

/// A per-task cooperative cancellation flag (SPEC_FULL.md §5). `cancel`
/// both flips the flag and wakes anyone parked in
/// [`CancelToken::cancellable_sleep`].
struct CancelToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn new() -> Self {
        Self { cancelled: AtomicBool::new(false), notify: Notify::new() }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps `duration` unless cancelled first. Returns `true` if the
    /// wait was cut short by cancellation — the monitor loop's single
    /// cancellable wait per iteration (spec.md §5).
    async fn cancellable_sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.notify.notified() => true,
        }
    }
}

struct MonitorTask {
    cancel: Arc<CancelToken>,
    handle: JoinHandle<()>,
}

/// Process-wide registry of monitor tasks. One `Scheduler` per process;
/// `start`/`stop`/`restart`/`cleanup` are the spec.md §4.7 operations.
pub struct Scheduler {
    store: Arc<Store>,
    cache: Arc<ReplicationCache>,
    clients: Arc<ClientRegistry>,
    tasks: Mutex<HashMap<ConfigId, MonitorTask>>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, cache: Arc<ReplicationCache>, clients: Arc<ClientRegistry>) -> Self {
        Self { store, cache, clients, tasks: Mutex::new(HashMap::new()) }
    }

    /// spec.md §4.7 `start(config_id)`: validates automatic + active,
    /// refuses if a live task already exists, then spawns the monitor
    /// task.
    pub async fn start(&self, config_id: ConfigId) -> SchedulerResult<()> {
        let config = self.store.get_configuration(config_id)?;
        if config.execution_mode != ExecutionMode::Automatic {
            return Err(SchedulerError::ConfigNotAutomatic(config_id));
        }
        if !config.active {
            return Err(SchedulerError::ConfigInactive(config_id));
        }
        let auto_sync = self
            .store
            .get_auto_sync(config_id)?
            .ok_or(SchedulerError::MissingAutoSyncSettings(config_id))?;

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(&config_id) {
            if !existing.handle.is_finished() {
                return Err(SchedulerError::AlreadyRunning(config_id));
            }
        }

        let cancel = Arc::new(CancelToken::new());
        let handle = self.spawn_monitor(
            config_id,
            auto_sync.check_interval_secs.max(1),
            auto_sync.delay_before_sync_secs,
            cancel.clone(),
        );
        tasks.insert(config_id, MonitorTask { cancel, handle });
        Ok(())
    }

    fn spawn_monitor(
        &self,
        config_id: ConfigId,
        check_interval_secs: u64,
        delay_before_sync_secs: u64,
        cancel: Arc<CancelToken>,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let clients = self.clients.clone();
        tokio::spawn(async move {
            if cancel.cancellable_sleep(Duration::from_secs(delay_before_sync_secs)).await {
                return;
            }
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                match drive_tick(&store, &cache, &clients, config_id).await {
                    Ok(report) => tracing::debug!(%config_id, ?report, "monitor tick complete"),
                    Err(err) => tracing::warn!(%config_id, error = %err, "monitor tick failed"),
                }
                if cancel.cancellable_sleep(Duration::from_secs(check_interval_secs)).await {
                    return;
                }
            }
        })
    }

    /// spec.md §4.7 `stop(id)`: sets the cancellation signal and joins
    /// with a 10s deadline.
    pub async fn stop(&self, config_id: ConfigId) -> SchedulerResult<()> {
        let task = {
            let mut tasks = self.tasks.lock().await;
            tasks.remove(&config_id)
        };
        let task = task.ok_or(SchedulerError::NotRunning(config_id))?;
        task.cancel.cancel();
        tokio::time::timeout(STOP_JOIN_DEADLINE, task.handle)
            .await
            .map_err(|_| SchedulerError::JoinTimeout(config_id))?
            .map_err(|_| SchedulerError::JoinTimeout(config_id))
    }

    /// spec.md §4.7 `restart(id) = stop(id); sleep 1s; start(id)`.
    pub async fn restart(&self, config_id: ConfigId) -> SchedulerResult<()> {
        self.stop(config_id).await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start(config_id).await
    }

    /// Process-wide `cleanup`: scans all active auto-configs, detects
    /// dead tasks (signal not set but task not alive) and restarts them
    /// (spec.md §4.7).
    pub async fn cleanup(&self) -> SchedulerResult<Vec<ConfigId>> {
        let mut revived = Vec::new();
        for settings in self.store.list_auto_sync_enabled()? {
            let config_id = settings.config_id;
            let is_dead = {
                let tasks = self.tasks.lock().await;
                tasks.get(&config_id).map(|t| !t.cancel.is_cancelled() && t.handle.is_finished()).unwrap_or(false)
            };
            if !is_dead {
                continue;
            }
            tracing::warn!(%config_id, "monitor task died unexpectedly, restarting");
            {
                let mut tasks = self.tasks.lock().await;
                tasks.remove(&config_id);
            }
            if self.start(config_id).await.is_ok() {
                revived.push(config_id);
            }
        }
        Ok(revived)
    }

    pub async fn is_running(&self, config_id: ConfigId) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.get(&config_id).map(|t| !t.handle.is_finished()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use his_sync_store::{AutoSyncSettings, ImportStrategyKind, Instance, MergeModeKind, SyncConfiguration, SyncType};

    fn manual_config(store: &Store) -> ConfigId {
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
        config.id
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(Store::open_temporary().unwrap()), Arc::new(ReplicationCache::default()), Arc::new(ClientRegistry::new()))
    }

    #[tokio::test]
    async fn start_refuses_a_manual_configuration() {
        let scheduler = scheduler();
        let config_id = manual_config(&scheduler.store);
        let err = scheduler.start(config_id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ConfigNotAutomatic(_)));
    }

    #[tokio::test]
    async fn stop_without_a_running_task_is_an_error() {
        let scheduler = scheduler();
        let config_id = uuid::Uuid::new_v4();
        let err = scheduler.stop(config_id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotRunning(_)));
    }

    #[tokio::test]
    async fn start_refuses_without_auto_sync_settings() {
        let scheduler = scheduler();
        let source = Instance::new("s", "http://127.0.0.1:1/api", "u", "p", true, false).unwrap();
        let destination = Instance::new("d", "http://127.0.0.1:1/api", "u", "p", false, true).unwrap();
        scheduler.store.put_instance(&source).unwrap();
        scheduler.store.put_instance(&destination).unwrap();
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
        scheduler.store.put_configuration(&config).unwrap();
        let err = scheduler.start(config.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::MissingAutoSyncSettings(_)));
    }

    #[tokio::test]
    async fn start_then_stop_round_trips_within_the_join_deadline() {
        let scheduler = scheduler();
        let source = Instance::new("s", "http://127.0.0.1:1/api", "u", "p", true, false).unwrap();
        let destination = Instance::new("d", "http://127.0.0.1:1/api", "u", "p", false, true).unwrap();
        scheduler.store.put_instance(&source).unwrap();
        scheduler.store.put_instance(&destination).unwrap();
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
        scheduler.store.put_configuration(&config).unwrap();
        let settings = AutoSyncSettings::new(config.id, 60).unwrap();
        scheduler.store.put_auto_sync(&settings).unwrap();

        scheduler.start(config.id).await.unwrap();
        assert!(scheduler.is_running(config.id).await);
        assert!(matches!(scheduler.start(config.id).await, Err(SchedulerError::AlreadyRunning(_))));

        scheduler.stop(config.id).await.unwrap();
        assert!(!scheduler.is_running(config.id).await);
    }
}
