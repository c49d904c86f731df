use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("client error: {0}")]
    Client(#[from] his_sync_client::ClientError),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
