use crate::archive::error::ArchiveError;
use crate::cache::error::CacheError;
use crate::harvest::walker::ParameterFetchError;
use crate::portal::error::PortalError;
use crate::reference::error::ReferenceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// No row was fetched and at least one parameter failed. Nothing was committed,
    /// so the industry is retried by the next run.
    #[error("No values fetched for industry {industry_id}: {} parameters failed", .failures.len())]
    NothingFetched {
        industry_id: i64,
        failures: Vec<ParameterFetchError>,
    },

    #[error("Failed to create data directory '{0}'")]
    DataDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),
}
