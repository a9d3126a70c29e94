//! Flat reference table of industries, exported as `industries.csv`.

pub mod error;

use crate::portal::client::scalar_to_string;
use crate::reference::error::ReferenceError;
use log::info;
use polars::prelude::{Column, CsvWriter, DataFrame, SerWriter};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::task;

/// `(JSON pointer into an industry record, output column)`, in output column order.
///
/// Contact details and the entity list of a record are not exported.
pub const INDUSTRY_COLUMNS: &[(&str, &str)] = &[
    ("/id", "id"),
    ("/name", "name"),
    ("/status", "status"),
    ("/createdDate", "created_date"),
    ("/lastUpdateDate", "last_update_date"),
    ("/address", "address"),
    ("/latitude", "latitude"),
    ("/longitude", "longitude"),
    ("/city", "city"),
    ("/code", "code"),
    ("/zip", "zip"),
    ("/timezone", "timezone"),
    ("/industryType/id", "industry_type_id"),
    ("/industryType/type", "industry_type"),
    ("/industryType/description", "industry_type_description"),
    ("/industryType/status", "industry_type_status"),
    ("/gangaSegment/id", "ganga_segment_id"),
    ("/gangaSegment/name", "ganga_segment_name"),
    ("/state/id", "state_id"),
    ("/state/name", "state_name"),
    ("/state/zone/id", "zone_id"),
    ("/state/zone/name", "zone_name"),
    ("/state/isGangaBasin", "state_is_ganga_basin"),
    ("/consumerLastDataAt", "consumer_last_data_at"),
    ("/spcbRegionalOffice", "spcb_regional_office"),
    ("/gangaBasin", "ganga_basin"),
    ("/isGangaBasin", "is_ganga_basin"),
];

/// One cell per [`INDUSTRY_COLUMNS`] entry; missing or non-scalar fields are `None`.
pub fn flatten_industry(record: &Value) -> Vec<Option<String>> {
    INDUSTRY_COLUMNS
        .iter()
        .map(|(pointer, _)| record.pointer(pointer).and_then(scalar_to_string))
        .collect()
}

/// Builds a string-typed frame with one row per record.
pub fn industries_frame(records: &[Value]) -> Result<DataFrame, ReferenceError> {
    let rows: Vec<Vec<Option<String>>> = records.iter().map(flatten_industry).collect();
    let columns: Vec<Column> = INDUSTRY_COLUMNS
        .iter()
        .enumerate()
        .map(|(idx, (_, name))| {
            let cells: Vec<Option<String>> = rows.iter().map(|row| row[idx].clone()).collect();
            Column::new((*name).into(), cells)
        })
        .collect();
    DataFrame::new(columns).map_err(ReferenceError::Frame)
}

/// Writes the flattened `records` to `path` as CSV with a header row.
///
/// The file is written next to its destination and renamed into place, so `path`
/// either keeps its old contents or holds the complete new table.
pub async fn write_industries_csv(records: &[Value], path: &Path) -> Result<usize, ReferenceError> {
    let mut df = industries_frame(records)?;
    let path_buf = path.to_path_buf();

    let written = task::spawn_blocking(move || {
        let parent = path_buf
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent)
            .map_err(|e| ReferenceError::CsvWriteIo(path_buf.clone(), e))?;
        CsvWriter::new(temp_file.as_file_mut())
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| ReferenceError::CsvWritePolars(path_buf.clone(), e))?;
        temp_file
            .flush()
            .map_err(|e| ReferenceError::CsvWriteIo(path_buf.clone(), e))?;
        temp_file
            .persist(&path_buf)
            .map_err(|e| ReferenceError::CsvWriteIo(path_buf.clone(), e.error))?;
        Ok::<usize, ReferenceError>(df.height())
    })
    .await??;

    info!("Wrote {} industries to {:?}", written, path);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "id": 1401,
            "name": "Acme Cement, Unit 2",
            "status": "Online",
            "city": "Bhiwani",
            "industryType": {"id": 7, "type": "Cement", "description": null},
            "gangaSegment": {"id": 3, "name": "Middle"},
            "state": {"id": 12, "name": "Haryana", "zone": {"id": 2, "name": "North"}, "isGangaBasin": false},
            "contactEmail": "ops@example.com",
            "contactNo": "0000",
            "listOfEntities": [1, 2, 3],
            "isGangaBasin": true
        })
    }

    fn cell<'a>(row: &'a [Option<String>], column: &str) -> Option<&'a str> {
        let idx = INDUSTRY_COLUMNS.iter().position(|(_, c)| *c == column)?;
        row[idx].as_deref()
    }

    #[test]
    fn test_flatten_follows_nested_pointers() {
        let row = flatten_industry(&record());
        assert_eq!(row.len(), INDUSTRY_COLUMNS.len());
        assert_eq!(cell(&row, "id"), Some("1401"));
        assert_eq!(cell(&row, "industry_type"), Some("Cement"));
        assert_eq!(cell(&row, "industry_type_description"), None);
        assert_eq!(cell(&row, "zone_name"), Some("North"));
        assert_eq!(cell(&row, "state_is_ganga_basin"), Some("false"));
        assert_eq!(cell(&row, "is_ganga_basin"), Some("true"));
        assert_eq!(cell(&row, "zip"), None);
    }

    #[test]
    fn test_ignored_fields_have_no_column() {
        for (_, column) in INDUSTRY_COLUMNS {
            assert!(!column.starts_with("contact"));
            assert_ne!(*column, "list_of_entities");
        }
    }

    #[tokio::test]
    async fn test_write_industries_csv() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("industries.csv");
        let written = write_industries_csv(&[record(), json!({"id": "9"})], &path).await?;
        assert_eq!(written, 2);

        let text = std::fs::read_to_string(&path)?;
        let mut lines = text.lines();
        let expected_header: Vec<&str> = INDUSTRY_COLUMNS.iter().map(|(_, c)| *c).collect();
        assert_eq!(lines.next(), Some(expected_header.join(",").as_str()));
        let first = lines.next().unwrap_or_default();
        assert!(first.starts_with("1401,\"Acme Cement, Unit 2\",Online,"));
        assert!(lines.next().unwrap_or_default().starts_with("9,,"));
        Ok(())
    }
}
