//! Year-partitioned, gzip-compressed CSV output with atomic promotion.
//!
//! Rows for a unit (usually one industry) are appended to
//! `{root}/{year}/{unit}.csv.gz.tmp`, one lazily opened stream per year. Only
//! [`PartitionWriter::commit`] renames them to their final `{unit}.csv.gz` paths and
//! then records a [`Manifest`]; [`PartitionWriter::rollback`] removes everything the
//! writer created. Readers must ignore `.tmp` files.

use crate::archive::error::ArchiveError;
use crate::archive::manifest::{write_manifest, Manifest, PartitionEntry};
use crate::types::value_row::{ValueRow, YearKey, CSV_COLUMNS};
use async_compression::tokio::write::GzipEncoder;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

pub const PARTITION_EXTENSION: &str = "csv.gz";
pub const TEMP_SUFFIX: &str = ".tmp";

struct OpenPartition {
    temp_path: PathBuf,
    final_path: PathBuf,
    encoder: GzipEncoder<BufWriter<File>>,
    rows: u64,
}

/// Outcome of a successful [`PartitionWriter::commit`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSummary {
    pub unit: String,
    pub rows: u64,
    pub files: Vec<PathBuf>,
    pub manifest: PathBuf,
}

pub struct PartitionWriter {
    root: PathBuf,
    unit: String,
    open: BTreeMap<YearKey, OpenPartition>,
    rows: u64,
}

/// Final path of one partition file.
pub fn partition_path(root: &Path, year: &YearKey, unit: &str) -> PathBuf {
    root.join(year.dir_name())
        .join(format!("{unit}.{PARTITION_EXTENSION}"))
}

/// Temporary path a partition is written to before commit.
pub fn temp_partition_path(root: &Path, year: &YearKey, unit: &str) -> PathBuf {
    root.join(year.dir_name())
        .join(format!("{unit}.{PARTITION_EXTENSION}{TEMP_SUFFIX}"))
}

async fn open_partition(
    root: &Path,
    year: &YearKey,
    unit: &str,
) -> Result<OpenPartition, ArchiveError> {
    let temp_path = temp_partition_path(root, year, unit);
    let final_path = partition_path(root, year, unit);
    let dir = root.join(year.dir_name());
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| ArchiveError::DirCreation(dir, e))?;

    if fs::try_exists(&temp_path).await.unwrap_or(false) {
        warn!(
            "Overwriting stale partial file {:?} left by an interrupted run",
            temp_path
        );
    }
    let file = File::create(&temp_path)
        .await
        .map_err(|e| ArchiveError::PartitionOpen(temp_path.clone(), e))?;
    let mut encoder = GzipEncoder::new(BufWriter::new(file));
    encoder
        .write_all(format!("{}\n", CSV_COLUMNS.join(",")).as_bytes())
        .await
        .map_err(|e| ArchiveError::PartitionWrite(temp_path.clone(), e))?;
    if *year == YearKey::Quarantine {
        warn!(
            "Unit {} has rows without a leading year in their timestamp; quarantining them in {:?}",
            unit, final_path
        );
    }
    debug!("Opened partition {} for unit {}", year, unit);

    Ok(OpenPartition {
        temp_path,
        final_path,
        encoder,
        rows: 0,
    })
}

/// Renders one row in partition column order, without the line terminator.
pub fn encode_row(row: &ValueRow) -> Result<String, ArchiveError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.serialize(row)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| ArchiveError::RowEncode(csv::Error::from(e.into_error())))?;
    let line = String::from_utf8_lossy(&bytes);
    Ok(line.trim_end_matches('\n').to_string())
}

impl PartitionWriter {
    pub fn new(root: &Path, unit: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            unit: unit.to_string(),
            open: BTreeMap::new(),
            rows: 0,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Rows written so far across all partitions.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Partitions opened so far.
    pub fn partitions(&self) -> impl Iterator<Item = &YearKey> {
        self.open.keys()
    }

    /// Drains `rows` into their year partitions, in encounter order.
    pub async fn write_rows<S>(&mut self, rows: S) -> Result<u64, ArchiveError>
    where
        S: Stream<Item = ValueRow>,
    {
        let mut rows = std::pin::pin!(rows);
        let mut written = 0;
        while let Some(row) = rows.next().await {
            self.write_row(&row).await?;
            written += 1;
        }
        Ok(written)
    }

    pub async fn write_row(&mut self, row: &ValueRow) -> Result<(), ArchiveError> {
        let line = encode_row(row)?;
        self.write_line(row.year_key(), &line).await
    }

    /// Appends an already encoded line (without terminator) to the given partition.
    pub async fn write_line(&mut self, year: YearKey, line: &str) -> Result<(), ArchiveError> {
        let partition = self.partition(year).await?;
        let result = async {
            partition.encoder.write_all(line.as_bytes()).await?;
            partition.encoder.write_all(b"\n").await
        }
        .await;
        result.map_err(|e| ArchiveError::PartitionWrite(partition.temp_path.clone(), e))?;
        partition.rows += 1;
        self.rows += 1;
        Ok(())
    }

    async fn partition(&mut self, year: YearKey) -> Result<&mut OpenPartition, ArchiveError> {
        match self.open.entry(year) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let opened = open_partition(&self.root, entry.key(), &self.unit).await?;
                Ok(entry.insert(opened))
            }
        }
    }

    /// Finishes every open stream, promotes each temporary file to its final path and
    /// finally writes the unit's manifest.
    ///
    /// Promotion is per file: if a rename fails, files renamed before it stay in
    /// place and the error is returned. The manifest is only written once every
    /// partition was promoted, so an interrupted commit never marks the unit complete.
    pub async fn commit(mut self) -> Result<CommitSummary, ArchiveError> {
        let open = std::mem::take(&mut self.open);

        let mut finished = Vec::with_capacity(open.len());
        for (year, mut partition) in open {
            let temp_path = partition.temp_path.clone();
            let result = async {
                partition.encoder.shutdown().await?;
                partition.encoder.get_mut().get_mut().sync_all().await
            }
            .await;
            result.map_err(|e| ArchiveError::PartitionFinish(temp_path, e))?;
            finished.push((year, partition));
        }

        let mut entries = Vec::with_capacity(finished.len());
        let mut files = Vec::with_capacity(finished.len());
        for (year, partition) in finished {
            fs::rename(&partition.temp_path, &partition.final_path)
                .await
                .map_err(|e| ArchiveError::Commit {
                    from: partition.temp_path.clone(),
                    to: partition.final_path.clone(),
                    source: e,
                })?;
            debug!("Promoted {:?}", partition.final_path);
            entries.push(PartitionEntry {
                partition: year.to_string(),
                file: format!("{}/{}.{}", year.dir_name(), self.unit, PARTITION_EXTENSION),
                rows: partition.rows,
            });
            files.push(partition.final_path);
        }

        let manifest = Manifest {
            unit: self.unit.clone(),
            rows: self.rows,
            partitions: entries,
            completed_at: Utc::now(),
        };
        let manifest_path = write_manifest(&self.root, &manifest).await?;
        info!(
            "Committed {} rows in {} partitions for unit {}",
            self.rows,
            files.len(),
            self.unit
        );

        Ok(CommitSummary {
            unit: self.unit,
            rows: self.rows,
            files,
            manifest: manifest_path,
        })
    }

    /// Discards everything this writer created by removing its temporary files.
    ///
    /// Only temporary files exist to remove: `commit` and `rollback` both consume the
    /// writer, so a rollback never follows a commit, even a failed one. Finals
    /// promoted by a commit that failed part way stay where they are.
    pub async fn rollback(mut self) -> Result<(), ArchiveError> {
        let open = std::mem::take(&mut self.open);
        let mut first_error = None;
        for (_, partition) in open {
            // Close the handle before removing the file.
            drop(partition.encoder);
            match fs::remove_file(&partition.temp_path).await {
                Ok(()) => debug!("Removed {:?}", partition.temp_path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {:?}: {}", partition.temp_path, e);
                    first_error.get_or_insert(ArchiveError::Rollback(partition.temp_path, e));
                }
            }
        }
        info!("Rolled back unit {}", self.unit);
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::archive::manifest::{is_complete, read_manifest};
    use async_compression::tokio::bufread::GzipDecoder;
    use futures_util::stream;
    use tokio::io::{AsyncReadExt, BufReader};

    pub(crate) async fn read_gz(path: &Path) -> io::Result<String> {
        let file = File::open(path).await?;
        let mut decoder = GzipDecoder::new(BufReader::new(file));
        let mut text = String::new();
        decoder.read_to_string(&mut text).await?;
        Ok(text)
    }

    pub(crate) fn row(param_key: &str, time: &str, value: Option<&str>) -> ValueRow {
        ValueRow {
            industry_id: 42,
            station_id: "site_1".into(),
            device_id: "dev_1".into(),
            param_key: param_key.into(),
            param_label: param_key.to_uppercase(),
            time: time.into(),
            value: value.map(str::to_string),
        }
    }

    fn year(y: &str) -> YearKey {
        YearKey::Year(y.to_string())
    }

    #[test]
    fn test_encode_row_column_order_and_quoting() -> Result<(), ArchiveError> {
        let mut r = row("pm", "2016-01-08 16:15:00:000", Some("12.5"));
        assert_eq!(
            encode_row(&r)?,
            "42,site_1,dev_1,pm,PM,2016-01-08 16:15:00:000,12.5"
        );
        r.param_label = "PM, filterable".into();
        r.value = None;
        assert_eq!(
            encode_row(&r)?,
            "42,site_1,dev_1,pm,\"PM, filterable\",2016-01-08 16:15:00:000,"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rows_land_in_lexical_year_partitions() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mut writer = PartitionWriter::new(dir.path(), "42");
        let rows = vec![
            row("pm", "2016-01-08 16:15:00:000", Some("1.0")),
            row("pm", "2019-12-31 23:59:59:999", Some("2.0")),
            row("sox", "2016-02-30 25:00:00:000", Some("3.0")),
        ];
        assert_eq!(writer.write_rows(stream::iter(rows)).await?, 3);

        // Nothing is visible at a final path before commit.
        assert!(temp_partition_path(dir.path(), &year("2016"), "42").exists());
        assert!(!partition_path(dir.path(), &year("2016"), "42").exists());
        assert!(!is_complete(dir.path(), "42").await);

        let summary = writer.commit().await?;
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.files.len(), 2);

        let y2016 = read_gz(&partition_path(dir.path(), &year("2016"), "42")).await?;
        assert_eq!(
            y2016,
            "industry_id,station_id,device_id,param_key,param_label,time,value\n\
             42,site_1,dev_1,pm,PM,2016-01-08 16:15:00:000,1.0\n\
             42,site_1,dev_1,sox,SOX,2016-02-30 25:00:00:000,3.0\n"
        );
        let y2019 = read_gz(&partition_path(dir.path(), &year("2019"), "42")).await?;
        assert!(y2019.ends_with("2019-12-31 23:59:59:999,2.0\n"));
        assert!(!temp_partition_path(dir.path(), &year("2016"), "42").exists());

        let manifest = read_manifest(dir.path(), "42").await?.expect("manifest");
        assert_eq!(manifest.rows, 3);
        let parts: Vec<&str> = manifest.partitions.iter().map(|p| p.partition.as_str()).collect();
        assert_eq!(parts, vec!["2016", "2019"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_rollback_leaves_final_paths_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let existing = partition_path(dir.path(), &year("2020"), "42");
        std::fs::create_dir_all(existing.parent().unwrap())?;
        std::fs::write(&existing, b"previous archive")?;

        let mut writer = PartitionWriter::new(dir.path(), "42");
        writer
            .write_row(&row("pm", "2020-06-01 00:00:00:000", Some("1.0")))
            .await?;
        writer
            .write_row(&row("pm", "2021-06-01 00:00:00:000", Some("1.0")))
            .await?;
        writer.rollback().await?;

        assert_eq!(std::fs::read(&existing)?, b"previous archive");
        assert!(!partition_path(dir.path(), &year("2021"), "42").exists());
        assert!(!temp_partition_path(dir.path(), &year("2020"), "42").exists());
        assert!(!temp_partition_path(dir.path(), &year("2021"), "42").exists());
        assert!(!is_complete(dir.path(), "42").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_rename_keeps_earlier_partitions_and_writes_no_manifest(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        // A directory sitting on the 2020 final path makes its rename fail.
        let blocked = partition_path(dir.path(), &year("2020"), "42");
        std::fs::create_dir_all(&blocked)?;

        let mut writer = PartitionWriter::new(dir.path(), "42");
        writer
            .write_row(&row("pm", "2019-06-01 00:00:00:000", Some("1.0")))
            .await?;
        writer
            .write_row(&row("pm", "2020-06-01 00:00:00:000", Some("2.0")))
            .await?;
        let result = writer.commit().await;

        match result {
            Err(ArchiveError::Commit { from, to, .. }) => {
                assert_eq!(from, temp_partition_path(dir.path(), &year("2020"), "42"));
                assert_eq!(to, blocked);
            }
            other => panic!("expected a commit error, got {other:?}"),
        }
        let promoted = read_gz(&partition_path(dir.path(), &year("2019"), "42")).await?;
        assert!(promoted.ends_with(",2019-06-01 00:00:00:000,1.0\n"));
        assert!(blocked.is_dir());
        assert!(!is_complete(dir.path(), "42").await);
        assert!(read_manifest(dir.path(), "42").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_timestamps_are_quarantined() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mut writer = PartitionWriter::new(dir.path(), "7");
        writer.write_row(&row("pm", "n/a", None)).await?;
        writer
            .write_row(&row("pm", "2022-01-01 00:00:00:000", Some("4.0")))
            .await?;
        let keys: Vec<String> = writer.partitions().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["2022", "quarantine"]);
        writer.commit().await?;

        let quarantined = read_gz(&partition_path(dir.path(), &YearKey::Quarantine, "7")).await?;
        assert!(quarantined.contains(",n/a,"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_commit_only_writes_manifest() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let summary = PartitionWriter::new(dir.path(), "9").commit().await?;
        assert!(summary.files.is_empty());
        assert!(is_complete(dir.path(), "9").await);
        let manifest = read_manifest(dir.path(), "9").await?.expect("manifest");
        assert_eq!(manifest.rows, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_temp_file_is_overwritten() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let stale = temp_partition_path(dir.path(), &year("2018"), "5");
        std::fs::create_dir_all(stale.parent().unwrap())?;
        std::fs::write(&stale, b"half a gzip stream")?;

        let mut writer = PartitionWriter::new(dir.path(), "5");
        writer
            .write_row(&row("pm", "2018-01-01 00:00:00:000", Some("1.0")))
            .await?;
        writer.commit().await?;

        let text = read_gz(&partition_path(dir.path(), &year("2018"), "5")).await?;
        assert_eq!(text.lines().count(), 2);
        Ok(())
    }
}
