use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("client error: {0}")]
    Client(#[from] his_sync_client::ClientError),
}

pub type DataResult<T> = Result<T, DataError>;
