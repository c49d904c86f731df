use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("client error: {0}")]
    Client(#[from] his_sync_client::ClientError),
    #[error("metadata pipeline error: {0}")]
    Metadata(#[from] his_sync_metadata::MetadataError),
    #[error("data pipeline error: {0}")]
    Data(#[from] his_sync_data::DataError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
