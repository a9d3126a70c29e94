use crate::cache::error::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Response from {url} is not valid JSON")]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected payload from {url}: {message}")]
    UnexpectedShape { url: String, message: String },

    #[error("Giving up on {label} after {attempts} attempts")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        last: Box<PortalError>,
    },

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl PortalError {
    /// The error that ended the last attempt, looking through retry exhaustion.
    pub fn last_cause(&self) -> &PortalError {
        match self {
            PortalError::RetriesExhausted { last, .. } => last.last_cause(),
            other => other,
        }
    }
}
