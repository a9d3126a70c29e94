//! Time-series value queries for a single parameter.

use crate::portal::client::scalar_to_string;
use crate::portal::error::PortalError;
use crate::types::relative_start::RelativeStart;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Identifies the series of one parameter of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueQuery<'a> {
    pub industry_id: i64,
    pub station_id: &'a str,
    pub device_id: &'a str,
    pub param_key: &'a str,
    pub start: RelativeStart,
}

impl fmt::Display for ValueQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "industry {} station {} device {} param {} ({})",
            self.industry_id, self.station_id, self.device_id, self.param_key, self.start
        )
    }
}

/// A single reading as returned by the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time: String,
    /// Scalar text exactly as sent (`40`, `"0.10"`, `"BDL"`); `None` for null or missing.
    pub value: Option<String>,
}

/// Points returned under one display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    pub points: Vec<Point>,
}

/// Successful value response: display name → points, in upstream point order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueSeries {
    pub series: Vec<NamedSeries>,
}

impl ValueSeries {
    /// Checks the minimal shape of a value response and converts it.
    ///
    /// The payload must be an object whose members are arrays of objects carrying a
    /// string `time`. Values are kept as their scalar text and never parsed.
    pub fn from_response(url: &str, payload: &Value) -> Result<Self, PortalError> {
        let shape_error = |message: String| PortalError::UnexpectedShape {
            url: url.to_string(),
            message,
        };

        let members = payload
            .as_object()
            .ok_or_else(|| shape_error("expected an object of series".to_string()))?;

        let mut series = Vec::with_capacity(members.len());
        for (name, raw_points) in members {
            let raw_points = raw_points
                .as_array()
                .ok_or_else(|| shape_error(format!("series '{name}' is not an array")))?;
            let mut points = Vec::with_capacity(raw_points.len());
            for (idx, raw) in raw_points.iter().enumerate() {
                let time = raw
                    .get("time")
                    .and_then(Value::as_str)
                    .ok_or_else(|| shape_error(format!("point {idx} of '{name}' has no time")))?;
                points.push(Point {
                    time: time.to_string(),
                    value: raw.get("value").and_then(scalar_to_string),
                });
            }
            series.push(NamedSeries {
                name: name.clone(),
                points,
            });
        }
        Ok(Self { series })
    }

    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }

    /// All points across every named series, in response order.
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.series.iter().flat_map(|s| s.points.iter())
    }
}

/// Something that can produce the series for a [`ValueQuery`].
///
/// Implemented by [`crate::PortalClient`]; the walker only depends on this trait.
pub trait ValueSource {
    fn fetch_values(
        &self,
        query: &ValueQuery<'_>,
    ) -> impl Future<Output = Result<ValueSeries, PortalError>>;
}

impl<T: ValueSource + ?Sized> ValueSource for &T {
    fn fetch_values(
        &self,
        query: &ValueQuery<'_>,
    ) -> impl Future<Output = Result<ValueSeries, PortalError>> {
        (**self).fetch_values(query)
    }
}
