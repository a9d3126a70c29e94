use crate::metadata::thresholds::ThresholdTable;
use crate::portal::client::{scalar_to_i64, scalar_to_string};
use crate::types::hierarchy::{Device, Industry, Parameter, Station};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identity of an industry as listed by the portal, before its metadata is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustrySummary {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub state: String,
}

impl IndustrySummary {
    /// Extracts id, name and location from an industry list record.
    ///
    /// `state` may be a nested object (`{"name": ...}`) or a plain string. Returns
    /// `None` when the record has no usable id.
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = record.get("id").and_then(scalar_to_i64)?;
        let state = match record.get("state") {
            Some(Value::Object(state)) => state.get("name").and_then(scalar_to_string),
            Some(other) => scalar_to_string(other),
            None => None,
        };
        Some(Self {
            id,
            name: text(record, "name"),
            city: text(record, "city"),
            state: state.unwrap_or_default(),
        })
    }
}

/// Normalizes the raw metadata of one industry into an [`Industry`] tree.
///
/// Returns `None` when the metadata has no `stations` list, the portal's way of
/// saying the industry has nothing to harvest. Malformed stations, devices or
/// parameters are skipped individually. Thresholds are looked up by
/// `(station_id, parameter_id)` and left empty when unknown.
pub fn resolve(
    summary: &IndustrySummary,
    raw: &Value,
    thresholds: &ThresholdTable,
) -> Option<Industry> {
    let stations = raw.get("stations")?.as_array()?;

    let stations = stations
        .iter()
        .filter_map(|raw_station| {
            let id = id_of(raw_station, "station", summary.id)?;
            let devices = list(raw_station, &["devices"])
                .filter_map(|raw_device| {
                    let device_id = id_of(raw_device, "device", summary.id)?;
                    let parameters = list(raw_device, &["params", "parameters"])
                        .filter_map(|raw_param| resolve_parameter(&id, raw_param, thresholds))
                        .collect();
                    Some(Device {
                        id: device_id,
                        name: text(raw_device, "name"),
                        parameters,
                    })
                })
                .collect();
            Some(Station {
                name: text(raw_station, "name"),
                id,
                devices,
            })
        })
        .collect();

    Some(Industry {
        id: summary.id,
        name: summary.name.clone(),
        city: summary.city.clone(),
        state: summary.state.clone(),
        stations,
    })
}

fn resolve_parameter(
    station_id: &str,
    raw: &Value,
    thresholds: &ThresholdTable,
) -> Option<Parameter> {
    let id = raw.get("id").and_then(scalar_to_string)?;
    let Some(key) = raw.get("key").and_then(scalar_to_string) else {
        debug!("Skipping parameter {} of station {}: no query key", id, station_id);
        return None;
    };
    Some(Parameter {
        threshold_max: thresholds.max_for(station_id, &id),
        kind: text(raw, "type"),
        name: text(raw, "name"),
        label: text(raw, "label"),
        unit: text(raw, "unit"),
        key,
        id,
    })
}

fn id_of(raw: &Value, what: &str, industry_id: i64) -> Option<String> {
    let id = raw.get("id").and_then(scalar_to_string);
    if id.is_none() {
        debug!("Skipping {} without id in industry {}", what, industry_id);
    }
    id
}

/// Iterates the first array found under any of `keys`; anything else is empty.
fn list<'a>(raw: &'a Value, keys: &[&str]) -> impl Iterator<Item = &'a Value> + 'a {
    keys.iter()
        .find_map(|key| raw.get(key).and_then(Value::as_array))
        .into_iter()
        .flatten()
}

fn text(raw: &Value, key: &str) -> String {
    raw.get(key).and_then(scalar_to_string).unwrap_or_default()
}

/// Resolved industries of one run, addressable by id.
#[derive(Debug, Default)]
pub struct IndustryCatalog {
    industries: BTreeMap<i64, Industry>,
}

impl IndustryCatalog {
    pub fn new(industries: impl IntoIterator<Item = Industry>) -> Self {
        Self {
            industries: industries.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&Industry> {
        self.industries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.industries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.industries.is_empty()
    }

    /// Industries for the requested ids, in request order. Unknown ids are logged and
    /// left out.
    pub fn select(&self, ids: &[i64]) -> Vec<&Industry> {
        ids.iter()
            .filter_map(|id| {
                let industry = self.industries.get(id);
                if industry.is_none() {
                    warn!("Unknown industry id {}; nothing to walk", id);
                }
                industry
            })
            .collect()
    }
}
