//! Re-partitions an existing single-file archive into the year layout.

use crate::archive::error::ArchiveError;
use crate::archive::partition::{CommitSummary, PartitionWriter, PARTITION_EXTENSION};
use crate::types::value_row::{YearKey, CSV_COLUMNS, TIME_COLUMN};
use async_compression::tokio::bufread::GzipDecoder;
use log::{info, warn};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Name of the unit a source archive holds: its file name without `.csv.gz`.
fn unit_of(source: &Path) -> Option<&str> {
    let name = source.file_name()?.to_str()?;
    let unit = name.strip_suffix(PARTITION_EXTENSION)?.strip_suffix('.')?;
    (!unit.is_empty()).then_some(unit)
}

/// Year key of one raw CSV line, read from its `time` field.
fn year_of_line(line: &str) -> YearKey {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record
            .get(TIME_COLUMN)
            .map_or(YearKey::Quarantine, YearKey::of),
        _ => YearKey::Quarantine,
    }
}

/// Splits the gzip CSV at `source` into `{root}/{year}/{unit}.csv.gz` partitions.
///
/// Lines are copied unchanged, in file order. Either every partition of the unit is
/// committed together with its manifest, or the temporary files are removed again.
pub async fn split(source: &Path, root: &Path) -> Result<CommitSummary, ArchiveError> {
    let unit = unit_of(source).ok_or_else(|| ArchiveError::InvalidSource(source.to_path_buf()))?;
    let mut writer = PartitionWriter::new(root, unit);

    match copy_lines(source, &mut writer).await {
        Ok(()) => writer.commit().await,
        Err(e) => {
            warn!("Splitting {:?} failed, rolling back: {}", source, e);
            if let Err(rollback_error) = writer.rollback().await {
                warn!("Rollback after failed split incomplete: {}", rollback_error);
            }
            Err(e)
        }
    }
}

async fn copy_lines(source: &Path, writer: &mut PartitionWriter) -> Result<(), ArchiveError> {
    let read_error = |e: std::io::Error| ArchiveError::SourceRead(source.to_path_buf(), e);

    let file = File::open(source).await.map_err(read_error)?;
    let mut decoder = GzipDecoder::new(BufReader::new(file));
    decoder.multiple_members(true);
    let mut lines = BufReader::new(decoder).lines();

    let expected = CSV_COLUMNS.join(",");
    let header = lines.next_line().await.map_err(read_error)?.unwrap_or_default();
    if header.trim_end_matches('\r') != expected {
        return Err(ArchiveError::UnexpectedHeader {
            path: source.to_path_buf(),
            found: header,
        });
    }

    while let Some(line) = lines.next_line().await.map_err(read_error)? {
        if line.is_empty() {
            continue;
        }
        writer.write_line(year_of_line(&line), &line).await?;
    }
    info!(
        "Read {} rows of unit {} from {:?}",
        writer.rows(),
        writer.unit(),
        source
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manifest::is_complete;
    use crate::archive::partition::partition_path;
    use crate::archive::partition::tests::read_gz;
    use async_compression::tokio::write::GzipEncoder;
    use std::path::PathBuf;
    use tokio::io::AsyncWriteExt;

    async fn write_gz(path: &Path, text: &str) -> std::io::Result<()> {
        let mut encoder = GzipEncoder::new(File::create(path).await?);
        encoder.write_all(text.as_bytes()).await?;
        encoder.shutdown().await
    }

    fn year(y: &str) -> YearKey {
        YearKey::Year(y.to_string())
    }

    const SOURCE: &str = "industry_id,station_id,device_id,param_key,param_label,time,value\n\
        42,site_1,dev_1,pm,PM,2019-12-31 23:45:00:000,1.5\n\
        42,site_1,dev_1,pm,\"PM, dust\",2020-01-01 00:00:00:000,2\n\
        42,site_1,dev_1,sox,SOX,2019-06-01 00:00:00:000,\n";

    #[tokio::test]
    async fn test_split_copies_lines_into_year_partitions() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("42.csv.gz");
        write_gz(&source, SOURCE).await?;
        let root = dir.path().join("out");

        let summary = split(&source, &root).await?;
        assert_eq!(summary.unit, "42");
        assert_eq!(summary.rows, 3);

        let y2019 = read_gz(&partition_path(&root, &year("2019"), "42")).await?;
        assert_eq!(
            y2019,
            "industry_id,station_id,device_id,param_key,param_label,time,value\n\
             42,site_1,dev_1,pm,PM,2019-12-31 23:45:00:000,1.5\n\
             42,site_1,dev_1,sox,SOX,2019-06-01 00:00:00:000,\n"
        );
        let y2020 = read_gz(&partition_path(&root, &year("2020"), "42")).await?;
        assert!(y2020.ends_with("\"PM, dust\",2020-01-01 00:00:00:000,2\n"));
        assert!(is_complete(&root, "42").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_split_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("42.csv.gz");
        write_gz(&source, SOURCE).await?;

        // Compressed bytes, not just the decoded text, must match between runs.
        let mut outputs: Vec<Vec<(PathBuf, Vec<u8>)>> = Vec::new();
        for name in ["a", "b"] {
            let root: PathBuf = dir.path().join(name);
            let summary = split(&source, &root).await?;
            let mut files = Vec::new();
            for file in &summary.files {
                let relative = file.strip_prefix(&root)?.to_path_buf();
                files.push((relative, std::fs::read(file)?));
            }
            outputs.push(files);
        }
        assert_eq!(outputs[0].len(), 2);
        assert_eq!(outputs[0], outputs[1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_split_rejects_foreign_header() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("42.csv.gz");
        write_gz(&source, "time,value\n2020-01-01 00:00:00:000,1\n").await?;
        let root = dir.path().join("out");

        let result = split(&source, &root).await;
        assert!(matches!(result, Err(ArchiveError::UnexpectedHeader { .. })));
        assert!(!is_complete(&root, "42").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_split_needs_a_csv_gz_source() {
        let result = split(Path::new("/nowhere/notes.txt"), Path::new("/nowhere")).await;
        assert!(matches!(result, Err(ArchiveError::InvalidSource(_))));
    }

    #[test]
    fn test_year_of_line_reads_the_time_field() {
        assert_eq!(
            year_of_line("1,\"a,b\",d,pm,\"x, y\",2021-03-01 00:00:00:000,1"),
            year("2021")
        );
        assert_eq!(year_of_line("1,s,d,pm,PM"), YearKey::Quarantine);
        assert_eq!(year_of_line("1,s,d,pm,PM,garbage,1"), YearKey::Quarantine);
    }
}
