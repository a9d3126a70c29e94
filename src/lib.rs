mod archive;
mod cache;
mod config;
mod error;
mod harvest;
mod harvester;
mod metadata;
mod portal;
mod reference;
mod types;
mod utils;

pub use config::*;
pub use error::HarvestError;
pub use harvester::*;

pub use archive::manifest::{is_complete, manifest_path, read_manifest, Manifest, PartitionEntry};
pub use archive::partition::{
    encode_row, partition_path, temp_partition_path, CommitSummary, PartitionWriter,
};
pub use archive::repartition::split;

pub use cache::key::CacheKey;
pub use cache::store::{CacheStore, FsStore, MemoryStore};
pub use cache::ResultCache;

pub use harvest::walker::{ParameterFetchError, Walker};

pub use metadata::resolver::{resolve, IndustryCatalog, IndustrySummary};
pub use metadata::thresholds::ThresholdTable;

pub use portal::client::{PortalClient, DEFAULT_BASE_URL};
pub use portal::retry::{retry_any, retry_transient, Backoff, RetryPolicy};
pub use portal::transport::{HttpTransport, Transport};
pub use portal::values::{NamedSeries, Point, ValueQuery, ValueSeries, ValueSource};

pub use reference::{flatten_industry, industries_frame, write_industries_csv, INDUSTRY_COLUMNS};

pub use types::hierarchy::{Device, Industry, Parameter, ParameterCoordinates, Station};
pub use types::relative_start::{ParseRelativeStartError, RelativeStart, StartUnit};
pub use types::value_row::{ValueRow, YearKey, CSV_COLUMNS};

pub use archive::error::ArchiveError;
pub use cache::error::CacheError;
pub use portal::error::PortalError;
pub use reference::error::ReferenceError;
