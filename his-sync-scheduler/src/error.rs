use his_sync_store::ConfigId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] his_sync_store::StoreError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] his_sync_lifecycle::LifecycleError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] his_sync_orchestrator::OrchestratorError),

    #[error("configuration {0} is not in automatic execution mode")]
    ConfigNotAutomatic(ConfigId),

    #[error("configuration {0} is not active")]
    ConfigInactive(ConfigId),

    #[error("configuration {0} has no auto-sync settings")]
    MissingAutoSyncSettings(ConfigId),

    #[error("a monitor task is already running for configuration {0}")]
    AlreadyRunning(ConfigId),

    #[error("no monitor task is running for configuration {0}")]
    NotRunning(ConfigId),

    #[error("monitor task for configuration {0} did not stop within the join deadline")]
    JoinTimeout(ConfigId),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
