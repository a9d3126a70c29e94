use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to create archive directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to open partition file '{0}'")]
    PartitionOpen(PathBuf, #[source] std::io::Error),

    #[error("Failed to write partition file '{0}'")]
    PartitionWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to finish partition file '{0}'")]
    PartitionFinish(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode row")]
    RowEncode(#[from] csv::Error),

    #[error("Failed to promote '{from}' to '{to}'")]
    Commit {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{0}' during rollback")]
    Rollback(PathBuf, #[source] std::io::Error),

    #[error("Failed to read source archive '{0}'")]
    SourceRead(PathBuf, #[source] std::io::Error),

    #[error("Source archive '{path}' has an unexpected header: '{found}'")]
    UnexpectedHeader { path: PathBuf, found: String },

    #[error("Cannot derive a unit name from source archive '{0}'")]
    InvalidSource(PathBuf),

    #[error("Failed to write manifest '{0}'")]
    ManifestWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to read manifest '{0}'")]
    ManifestRead(PathBuf, #[source] std::io::Error),

    #[error("Manifest '{0}' is not valid JSON")]
    ManifestDecode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode manifest for unit '{0}'")]
    ManifestEncode(String, #[source] serde_json::Error),
}
