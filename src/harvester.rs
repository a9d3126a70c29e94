//! Entry point tying the portal, the walker and the partitioned archive together.

use crate::archive::error::ArchiveError;
use crate::archive::manifest::is_complete;
use crate::archive::partition::{CommitSummary, PartitionWriter};
use crate::archive::repartition::split;
use crate::cache::store::{CacheStore, FsStore};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::harvest::walker::{ParameterFetchError, Walker};
use crate::metadata::resolver::{resolve, IndustrySummary};
use crate::metadata::thresholds::ThresholdTable;
use crate::portal::client::PortalClient;
use crate::portal::transport::{HttpTransport, Transport};
use crate::reference::write_industries_csv;
use crate::types::relative_start::RelativeStart;
use crate::utils::{ensure_dir_exists, get_cache_dir};
use bon::bon;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

pub const INDUSTRIES_FILE: &str = "industries.csv";

/// What [`Harvester::harvest_industry`] did for one industry.
#[derive(Debug)]
pub enum HarvestOutcome {
    /// A manifest already existed; nothing was fetched.
    Skipped,
    /// The portal lists no stations for the industry. An empty manifest was committed.
    NoData,
    Harvested {
        rows: u64,
        partitions: usize,
        /// Parameters whose values could not be fetched; their rows are missing.
        failures: Vec<ParameterFetchError>,
    },
}

/// Tally of a best-effort [`Harvester::harvest`] run.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub harvested: Vec<i64>,
    pub skipped: Vec<i64>,
    pub no_data: Vec<i64>,
    pub failed: Vec<(i64, HarvestError)>,
    pub rows: u64,
    pub parameter_failures: Vec<ParameterFetchError>,
}

impl HarvestReport {
    fn record(&mut self, industry_id: i64, outcome: HarvestOutcome) {
        match outcome {
            HarvestOutcome::Skipped => self.skipped.push(industry_id),
            HarvestOutcome::NoData => self.no_data.push(industry_id),
            HarvestOutcome::Harvested { rows, failures, .. } => {
                self.harvested.push(industry_id);
                self.rows += rows;
                self.parameter_failures.extend(failures);
            }
        }
    }
}

/// Downloads industry time series into `{data_dir}/{year}/{industry}.csv.gz`.
///
/// Industries are processed one after another. A failure while harvesting one industry
/// is logged and recorded, and the run moves on to the next.
///
/// # Examples
///
/// ```no_run
/// # use ocems_harvest::{HarvestConfig, HarvestError, Harvester, RelativeStart};
/// # async fn run() -> Result<(), HarvestError> {
/// let harvester = Harvester::new(HarvestConfig::default()).await?;
/// let report = harvester
///     .harvest()
///     .industries(vec![1401, 1402])
///     .start(RelativeStart::days(2))
///     .call()
///     .await?;
/// println!("{} rows, {} failed industries", report.rows, report.failed.len());
/// # Ok(())
/// # }
/// ```
pub struct Harvester<T = HttpTransport, S = FsStore> {
    client: PortalClient<T, S>,
    data_dir: PathBuf,
}

impl Harvester {
    /// Creates the data and cache directories and an HTTP-backed client.
    ///
    /// # Errors
    ///
    /// Directory resolution or creation failures, and [`HarvestError::Portal`] if the
    /// HTTP client cannot be built. These are the only errors that stop a whole run.
    pub async fn new(config: HarvestConfig) -> Result<Self, HarvestError> {
        let cache_dir = match config.cache_dir {
            Some(dir) => dir,
            None => get_cache_dir().map_err(HarvestError::CacheDirResolution)?,
        };
        ensure_dir_exists(&cache_dir)
            .await
            .map_err(|e| HarvestError::CacheDirCreation(cache_dir.clone(), e))?;
        ensure_dir_exists(&config.data_dir)
            .await
            .map_err(|e| HarvestError::DataDirCreation(config.data_dir.clone(), e))?;

        let client = PortalClient::new(
            HttpTransport::new(config.accept_invalid_certs)?,
            FsStore::new(&cache_dir),
            &config.base_url,
            config.retry,
            config.avg_window_minutes,
            config.cache_values,
        );
        Ok(Self::with_client(client, config.data_dir))
    }
}

#[bon]
impl<T: Transport, S: CacheStore> Harvester<T, S> {
    pub fn with_client(client: PortalClient<T, S>, data_dir: PathBuf) -> Self {
        Self { client, data_dir }
    }

    pub fn client(&self) -> &PortalClient<T, S> {
        &self.client
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Harvests one industry: resolve its metadata, walk every parameter and commit
    /// the year partitions.
    ///
    /// An industry with a committed manifest is skipped before any request is made.
    /// If writing fails, the partial temporary files are removed and the error is
    /// returned. A failing parameter only loses that parameter's rows, unless no row
    /// was fetched at all: then nothing is committed and
    /// [`HarvestError::NothingFetched`] is returned, so a later run tries again.
    pub async fn harvest_industry(
        &self,
        summary: &IndustrySummary,
        thresholds: &ThresholdTable,
        start: RelativeStart,
    ) -> Result<HarvestOutcome, HarvestError> {
        let unit = summary.id.to_string();
        if is_complete(&self.data_dir, &unit).await {
            info!("Industry {} ({}) already downloaded, skipping", summary.id, summary.name);
            return Ok(HarvestOutcome::Skipped);
        }

        let raw = self.client.industry_metadata(summary.id).await?;
        let Some(industry) = resolve(summary, &raw, thresholds) else {
            info!("Industry {} ({}) has no stations", summary.id, summary.name);
            PartitionWriter::new(&self.data_dir, &unit).commit().await?;
            return Ok(HarvestOutcome::NoData);
        };
        info!(
            "Harvesting industry {} ({}, {}): {} parameters since {}",
            industry.id,
            industry.name,
            industry.city,
            industry.parameter_count(),
            start
        );

        let walker = Walker::new(&self.client);
        let mut writer = PartitionWriter::new(&self.data_dir, &unit);
        let written = writer.write_rows(walker.walk([&industry], start)).await;
        let failures = walker.take_failures();
        if let Err(e) = written {
            error!("Writing industry {} failed: {}", industry.id, e);
            if let Err(rollback_error) = writer.rollback().await {
                warn!("Rollback of industry {} incomplete: {}", industry.id, rollback_error);
            }
            return Err(e.into());
        }
        if writer.rows() == 0 && !failures.is_empty() {
            warn!(
                "Industry {}: all {} fetched parameters failed, leaving it for the next run",
                industry.id,
                failures.len()
            );
            if let Err(rollback_error) = writer.rollback().await {
                warn!("Rollback of industry {} incomplete: {}", industry.id, rollback_error);
            }
            return Err(HarvestError::NothingFetched {
                industry_id: industry.id,
                failures,
            });
        }
        let CommitSummary { rows, files, .. } = writer.commit().await?;

        if !failures.is_empty() {
            warn!(
                "Industry {}: {} parameters could not be fetched",
                industry.id,
                failures.len()
            );
        }
        Ok(HarvestOutcome::Harvested {
            rows,
            partitions: files.len(),
            failures,
        })
    }

    /// Harvests the active industries, or only `industries` when given.
    ///
    /// # Arguments
    ///
    /// * `.industries(Vec<i64>)`: Optional. Ids to harvest; unknown ids are logged and skipped.
    /// * `.start(RelativeStart)`: Optional. How far back to query. Defaults to ten years.
    ///
    /// # Errors
    ///
    /// Only failures to list the industries end the run early. Per-industry failures
    /// are collected in [`HarvestReport::failed`].
    #[builder]
    pub async fn harvest(
        &self,
        industries: Option<Vec<i64>>,
        start: Option<RelativeStart>,
    ) -> Result<HarvestReport, HarvestError> {
        let start = start.unwrap_or_default();
        let records = self.client.all_industries().await?;
        let summaries: Vec<IndustrySummary> = records
            .iter()
            .filter_map(IndustrySummary::from_record)
            .collect();

        let selected: Vec<&IndustrySummary> = match &industries {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let summary = summaries.iter().find(|s| s.id == *id);
                    if summary.is_none() {
                        warn!("Unknown industry id {}; skipping", id);
                    }
                    summary
                })
                .collect(),
            None => {
                let active = self.client.active_industry_ids().await?;
                summaries.iter().filter(|s| active.contains(&s.id)).collect()
            }
        };

        let thresholds = match self.client.thresholds().await {
            Ok(payload) => ThresholdTable::from_payload(&payload),
            Err(e) => {
                warn!("Parameter thresholds unavailable, continuing without: {}", e);
                ThresholdTable::default()
            }
        };

        info!("Harvesting {} industries", selected.len());
        let mut report = HarvestReport::default();
        for (idx, summary) in selected.iter().enumerate() {
            info!("[{}/{}] industry {}", idx + 1, selected.len(), summary.id);
            match self.harvest_industry(summary, &thresholds, start).await {
                Ok(outcome) => report.record(summary.id, outcome),
                Err(e) => {
                    error!("Industry {} failed: {}", summary.id, e);
                    report.failed.push((summary.id, e));
                }
            }
        }
        info!(
            "Harvest finished: {} harvested, {} skipped, {} without data, {} failed, {} rows",
            report.harvested.len(),
            report.skipped.len(),
            report.no_data.len(),
            report.failed.len(),
            report.rows
        );
        Ok(report)
    }

    /// Writes the active industries to `{data_dir}/industries.csv`.
    pub async fn download_industries(&self) -> Result<PathBuf, HarvestError> {
        let records = self.client.all_industries().await?;
        let active = self.client.active_industry_ids().await?;
        let active_records: Vec<_> = records
            .into_iter()
            .filter(|record| {
                IndustrySummary::from_record(record).is_some_and(|s| active.contains(&s.id))
            })
            .collect();

        let path = self.data_dir.join(INDUSTRIES_FILE);
        write_industries_csv(&active_records, &path).await?;
        Ok(path)
    }

    /// Re-partitions existing single-file archives into the data directory.
    ///
    /// Each source is handled on its own; failures are logged and returned in place.
    pub async fn split_archives(
        &self,
        sources: &[PathBuf],
    ) -> Vec<Result<CommitSummary, ArchiveError>> {
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let result = split(source, &self.data_dir).await;
            match &result {
                Ok(summary) => info!(
                    "Split {:?} into {} partitions ({} rows)",
                    source,
                    summary.files.len(),
                    summary.rows
                ),
                Err(e) => error!("Failed to split {:?}: {}", source, e),
            }
            results.push(result);
        }
        results
    }
}
