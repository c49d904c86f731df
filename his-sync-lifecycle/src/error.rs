use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("detector error: {0}")]
    Detector(#[from] his_sync_detector::DetectorError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
