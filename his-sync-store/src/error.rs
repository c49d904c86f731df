use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unique constraint violated: {0}")]
    UniqueConstraint(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration {0} has a job in pending or running state and cannot be mutated")]
    ConfigurationBusy(String),

    #[error("corrupt index entry: {0}")]
    CorruptIndex(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
