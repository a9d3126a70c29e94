use crate::portal::client::scalar_to_string;
use serde_json::Value;
use std::collections::HashMap;

/// Published parameter maxima keyed by `(station_id, parameter_id)`.
///
/// Built once per run from the portal's limits listing and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdTable {
    limits: HashMap<(String, String), f64>,
}

impl ThresholdTable {
    /// Builds the table from a list of `{stationId, paramId, max}` records.
    ///
    /// Records without a station, a parameter or a numeric maximum are skipped; a
    /// payload that is not a list yields an empty table.
    pub fn from_payload(payload: &Value) -> Self {
        let limits = payload
            .as_array()
            .map(|records| {
                records
                    .iter()
                    .filter_map(|record| {
                        let station = record.get("stationId").and_then(scalar_to_string)?;
                        let param = record.get("paramId").and_then(scalar_to_string)?;
                        let max = match record.get("max")? {
                            Value::Number(n) => n.as_f64(),
                            Value::String(s) => s.trim().parse().ok(),
                            _ => None,
                        }?;
                        Some(((station, param), max))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { limits }
    }

    pub fn insert(&mut self, station_id: &str, parameter_id: &str, max: f64) {
        self.limits
            .insert((station_id.to_string(), parameter_id.to_string()), max);
    }

    pub fn max_for(&self, station_id: &str, parameter_id: &str) -> Option<f64> {
        self.limits
            .get(&(station_id.to_string(), parameter_id.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload_skips_incomplete_records() {
        let table = ThresholdTable::from_payload(&json!([
            {"stationId": "site_1", "paramId": 5, "max": 50},
            {"stationId": "site_1", "paramId": "6", "max": "100.5"},
            {"stationId": "site_2", "paramId": 5},
            {"paramId": 5, "max": 1},
            "garbage"
        ]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.max_for("site_1", "5"), Some(50.0));
        assert_eq!(table.max_for("site_1", "6"), Some(100.5));
        assert_eq!(table.max_for("site_2", "5"), None);
    }

    #[test]
    fn test_non_list_payload_is_empty() {
        assert!(ThresholdTable::from_payload(&json!({"error": "x"})).is_empty());
    }
}
