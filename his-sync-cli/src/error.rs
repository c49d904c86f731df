use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] his_sync_config::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] his_sync_store::StoreError),
    #[error("client error: {0}")]
    Client(#[from] his_sync_client::ClientError),
    #[error("detector error: {0}")]
    Detector(#[from] his_sync_detector::DetectorError),
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] his_sync_lifecycle::LifecycleError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] his_sync_scheduler::SchedulerError),
    #[error("no configuration matched {0}")]
    NoSuchConfiguration(Uuid),
    #[error("no eligible configurations were found")]
    NoEligibleConfigurations,
}

pub type CliResult<T> = Result<T, CliError>;
