use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("Failed to build industry table")]
    Frame(#[source] polars::error::PolarsError),

    #[error("Failed to write industry table '{0}'")]
    CsvWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode industry table '{0}' as CSV")]
    CsvWritePolars(PathBuf, #[source] polars::error::PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
