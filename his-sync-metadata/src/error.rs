use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("client error: {0}")]
    Client(#[from] his_sync_client::ClientError),

    #[error("authentication failed, aborting metadata pipeline")]
    Authentication,
}

pub type MetadataResult<T> = Result<T, MetadataError>;
