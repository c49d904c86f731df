use thiserror::Error;

/// Errors surfaced by the HTTP client.
///
/// Variants map to the error taxonomy in SPEC_FULL.md §7: transport and
/// authentication failures are distinguished so callers can decide what is
/// retryable and what is fatal for a Job.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("authentication failed for {url} (HTTP {status})")]
    Authentication { url: String, status: u16 },

    #[error("resource {resource} not available on this server (HTTP 404)")]
    ResourceNotAvailable { resource: String },

    #[error("unexpected HTTP status {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse response body from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response from {url} did not match any known import report shape")]
    UnrecognizedReportShape { url: String },
}

pub type ClientResult<T> = Result<T, ClientError>;
