//! Flat harvested rows and the lexical year key used to partition them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column order of every partition file.
pub const CSV_COLUMNS: [&str; 7] = [
    "industry_id",
    "station_id",
    "device_id",
    "param_key",
    "param_label",
    "time",
    "value",
];

/// Index of the `time` column within [`CSV_COLUMNS`].
pub(crate) const TIME_COLUMN: usize = 5;

/// One reading of one parameter, flattened with its hierarchy coordinates.
///
/// Field order matches [`CSV_COLUMNS`]; the struct serializes directly into a partition row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ValueRow {
    pub industry_id: i64,
    pub station_id: String,
    pub device_id: String,
    pub param_key: String,
    pub param_label: String,
    /// Naive local timestamp exactly as returned upstream (`YYYY-MM-DD HH:MM:SS:mmm`).
    pub time: String,
    /// Reading text as returned upstream, written unchanged; empty when absent.
    pub value: Option<String>,
}

impl ValueRow {
    pub fn year_key(&self) -> YearKey {
        YearKey::of(&self.time)
    }
}

/// The partition a row lands in.
///
/// Derived lexically from the leading four characters of the timestamp, never by
/// parsing a calendar date. Timestamps without a leading year token go to
/// [`YearKey::Quarantine`] instead of failing the write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum YearKey {
    Year(String),
    Quarantine,
}

impl YearKey {
    pub fn of(time: &str) -> Self {
        match time.get(..4) {
            Some(prefix) if prefix.bytes().all(|b| b.is_ascii_digit()) => {
                YearKey::Year(prefix.to_string())
            }
            _ => YearKey::Quarantine,
        }
    }

    /// Directory name of this partition under the archive root.
    pub fn dir_name(&self) -> &str {
        match self {
            YearKey::Year(year) => year,
            YearKey::Quarantine => "quarantine",
        }
    }
}

impl fmt::Display for YearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
