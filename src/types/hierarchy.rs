//! Defines the normalized monitoring hierarchy: industries own stations, stations
//! own devices, and devices own the parameters they measure.

use serde::{Deserialize, Serialize};

/// A monitored facility together with everything that reports data for it.
///
/// Resolved once per harvesting run by [`crate::resolve`] and never mutated afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Industry {
    /// The portal's numeric industry identifier.
    pub id: i64,
    /// The registered name of the facility.
    pub name: String,
    /// City the facility is registered in.
    pub city: String,
    /// State the facility is registered in.
    pub state: String,
    /// Monitoring stations installed at the facility.
    pub stations: Vec<Station>,
}

/// A monitoring station inside an [`Industry`] (a stack, an ambient monitor, an outlet...).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Station {
    /// Station identifier as used in portal queries.
    pub id: String,
    /// Human readable station name.
    pub name: String,
    /// Sensing devices mounted at this station.
    pub devices: Vec<Device>,
}

/// A sensing device at a [`Station`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Device {
    /// Device identifier as used in portal queries.
    pub id: String,
    /// Human readable device name.
    pub name: String,
    /// Quantities measured by this device.
    pub parameters: Vec<Parameter>,
}

/// A single measured quantity of a [`Device`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter identifier, used together with the station id to look up thresholds.
    pub id: String,
    /// Parameter category reported by the portal (`type` upstream).
    pub kind: String,
    /// Parameter name.
    pub name: String,
    /// Short code sent in time-series queries (e.g. `pm`, `sox`).
    pub key: String,
    /// Human readable label, copied into every harvested row.
    pub label: String,
    /// Measurement unit.
    pub unit: String,
    /// Regulatory maximum for this parameter at this station, when one is published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_max: Option<f64>,
}

/// Borrowed coordinates of one parameter within the hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct ParameterCoordinates<'a> {
    pub industry: &'a Industry,
    pub station: &'a Station,
    pub device: &'a Device,
    pub parameter: &'a Parameter,
}

impl Industry {
    /// Iterates over every parameter of this industry in hierarchy order
    /// (station, then device, then parameter).
    pub fn parameters(&self) -> impl Iterator<Item = ParameterCoordinates<'_>> + '_ {
        self.stations.iter().flat_map(move |station| {
            station.devices.iter().flat_map(move |device| {
                device
                    .parameters
                    .iter()
                    .map(move |parameter| ParameterCoordinates {
                        industry: self,
                        station,
                        device,
                        parameter,
                    })
            })
        })
    }

    /// Total number of parameters across all stations and devices.
    pub fn parameter_count(&self) -> usize {
        self.stations
            .iter()
            .flat_map(|s| s.devices.iter())
            .map(|d| d.parameters.len())
            .sum()
    }
}
