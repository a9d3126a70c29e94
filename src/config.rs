//! Run configuration.

use crate::portal::client::DEFAULT_BASE_URL;
use crate::portal::retry::RetryPolicy;
use bon::Builder;
use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_AVG_WINDOW_MINUTES: u32 = 15;

/// Settings for a [`crate::Harvester`].
///
/// # Examples
///
/// ```
/// use ocems_harvest::HarvestConfig;
///
/// let config = HarvestConfig::builder()
///     .data_dir("/tmp/ocems")
///     .avg_window_minutes(60)
///     .build();
/// assert_eq!(config.avg_window_minutes, 60);
/// assert!(config.cache_values);
/// assert!(config.cache_dir.is_none());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct HarvestConfig {
    /// Archive root: year partitions, manifests and `industries.csv` live here.
    #[builder(default = PathBuf::from(DEFAULT_DATA_DIR), into)]
    pub data_dir: PathBuf,
    /// Result cache location. `None` uses a directory under the system cache dir.
    #[builder(into)]
    pub cache_dir: Option<PathBuf>,
    #[builder(default = DEFAULT_BASE_URL.to_string(), into)]
    pub base_url: String,
    /// Averaging window requested for value series.
    #[builder(default = DEFAULT_AVG_WINDOW_MINUTES)]
    pub avg_window_minutes: u32,
    #[builder(default)]
    pub retry: RetryPolicy,
    /// Memoise value responses per calendar day.
    #[builder(default = true)]
    pub cache_values: bool,
    #[builder(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
