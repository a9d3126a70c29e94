//! Traversal of the industry → station → device → parameter tree into flat rows.

use crate::portal::error::PortalError;
use crate::portal::values::{ValueQuery, ValueSource};
use crate::types::hierarchy::{Industry, ParameterCoordinates};
use crate::types::relative_start::RelativeStart;
use crate::types::value_row::ValueRow;
use futures_util::stream::{self, Stream, StreamExt};
use log::{debug, error};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// A parameter whose values could not be fetched. Contained by the walker: it is
/// logged and recorded, and the walk moves on to the next parameter.
#[derive(Debug, Error)]
#[error(
    "Failed to fetch parameter '{param_key}' of industry {industry_id}, station {station_id}, device {device_id}"
)]
pub struct ParameterFetchError {
    pub industry_id: i64,
    pub station_id: String,
    pub device_id: String,
    pub param_key: String,
    #[source]
    pub source: PortalError,
}

/// Walks resolved industries and turns every returned point into a [`ValueRow`].
pub struct Walker<V> {
    source: V,
    failures: Mutex<Vec<ParameterFetchError>>,
}

impl<V: ValueSource> Walker<V> {
    pub fn new(source: V) -> Self {
        Self {
            source,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Lazily yields the rows of every parameter of `industries`.
    ///
    /// Parameters are fetched one at a time, only as the stream is polled, in
    /// hierarchy order (industry, station, device, parameter), with points in the
    /// order the portal returned them. A parameter that fails is logged, recorded
    /// (see [`Walker::take_failures`]) and contributes no rows.
    pub fn walk<'a, I>(&'a self, industries: I, start: RelativeStart) -> impl Stream<Item = ValueRow> + 'a
    where
        I: IntoIterator<Item = &'a Industry>,
        I::IntoIter: 'a,
    {
        stream::iter(industries.into_iter().flat_map(Industry::parameters))
            .then(move |coordinates| self.fetch_rows(coordinates, start))
            .flat_map(stream::iter)
    }

    /// Failures recorded since the last call, in encounter order.
    pub fn take_failures(&self) -> Vec<ParameterFetchError> {
        std::mem::take(
            &mut *self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    async fn fetch_rows(
        &self,
        coordinates: ParameterCoordinates<'_>,
        start: RelativeStart,
    ) -> Vec<ValueRow> {
        let ParameterCoordinates {
            industry,
            station,
            device,
            parameter,
        } = coordinates;
        let query = ValueQuery {
            industry_id: industry.id,
            station_id: &station.id,
            device_id: &device.id,
            param_key: &parameter.key,
            start,
        };

        match self.source.fetch_values(&query).await {
            Ok(series) => {
                debug!("Fetched {} points for {}", series.point_count(), query);
                series
                    .points()
                    .map(|point| ValueRow {
                        industry_id: industry.id,
                        station_id: station.id.clone(),
                        device_id: device.id.clone(),
                        param_key: parameter.key.clone(),
                        param_label: parameter.label.clone(),
                        time: point.time.clone(),
                        value: point.value.clone(),
                    })
                    .collect()
            }
            Err(source) => {
                let failure = ParameterFetchError {
                    industry_id: industry.id,
                    station_id: station.id.clone(),
                    device_id: device.id.clone(),
                    param_key: parameter.key.clone(),
                    source,
                };
                error!("{}: {}", failure, failure.source);
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(failure);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::values::{NamedSeries, Point, ValueSeries};
    use crate::types::hierarchy::{Device, Parameter, Station};
    use std::cell::RefCell;

    /// Returns two points per parameter; keys listed in `failing` always fail.
    #[derive(Default)]
    struct ScriptedSource {
        failing: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl ValueSource for ScriptedSource {
        async fn fetch_values(&self, query: &ValueQuery<'_>) -> Result<ValueSeries, PortalError> {
            self.calls.borrow_mut().push(query.param_key.to_string());
            if self.failing.contains(&query.param_key) {
                return Err(PortalError::RetriesExhausted {
                    label: query.to_string(),
                    attempts: 3,
                    last: Box::new(PortalError::UnexpectedShape {
                        url: "u".into(),
                        message: "boom".into(),
                    }),
                });
            }
            Ok(ValueSeries {
                series: vec![NamedSeries {
                    name: query.param_key.to_uppercase(),
                    points: vec![
                        Point {
                            time: "2020-01-01 00:00:00:000".into(),
                            value: Some("1.0".into()),
                        },
                        Point {
                            time: "2020-01-01 00:15:00:000".into(),
                            value: None,
                        },
                    ],
                }],
            })
        }
    }

    fn parameter(key: &str) -> Parameter {
        Parameter {
            id: key.to_string(),
            kind: "emission".into(),
            name: key.to_string(),
            key: key.to_string(),
            label: key.to_uppercase(),
            unit: "mg/Nm3".into(),
            threshold_max: None,
        }
    }

    fn industry(id: i64, keys: &[&str]) -> Industry {
        Industry {
            id,
            name: format!("Industry {id}"),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            stations: vec![Station {
                id: "site_1".into(),
                name: "Stack".into(),
                devices: vec![Device {
                    id: "dev_1".into(),
                    name: "Analyzer".into(),
                    parameters: keys.iter().map(|k| parameter(k)).collect(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_failed_parameter_is_isolated() {
        let source = ScriptedSource {
            failing: vec!["p2"],
            ..Default::default()
        };
        let walker = Walker::new(&source);
        let industry = industry(1, &["p1", "p2", "p3"]);

        let rows: Vec<ValueRow> = walker
            .walk([&industry], RelativeStart::days(2))
            .collect()
            .await;

        let keys: Vec<&str> = rows.iter().map(|r| r.param_key.as_str()).collect();
        assert_eq!(keys, vec!["p1", "p1", "p3", "p3"]);
        assert_eq!(rows[0].param_label, "P1");
        assert_eq!(rows[1].value, None);

        let failures = walker.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].param_key, "p2");
        assert_eq!(failures[0].station_id, "site_1");
        assert!(walker.take_failures().is_empty());
    }

    #[tokio::test]
    async fn test_walk_is_lazy_and_ordered() {
        let source = ScriptedSource::default();
        let walker = Walker::new(&source);
        let industries = vec![industry(1, &["pm", "sox"]), industry(2, &["nox"])];

        let stream = walker.walk(&industries, RelativeStart::years(10));
        assert!(source.calls.borrow().is_empty());

        let first_three: Vec<ValueRow> = stream.take(3).collect().await;
        assert_eq!(*source.calls.borrow(), vec!["pm", "sox"]);
        assert_eq!(first_three[2].param_key, "sox");

        let all: Vec<(i64, String)> = walker
            .walk(&industries, RelativeStart::years(10))
            .map(|r| (r.industry_id, r.param_key))
            .collect()
            .await;
        assert_eq!(
            all,
            vec![
                (1, "pm".to_string()),
                (1, "pm".to_string()),
                (1, "sox".to_string()),
                (1, "sox".to_string()),
                (2, "nox".to_string()),
                (2, "nox".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_walk_yields_nothing() {
        let source = ScriptedSource::default();
        let walker = Walker::new(&source);
        let rows: Vec<ValueRow> = walker
            .walk(std::iter::empty(), RelativeStart::days(2))
            .collect()
            .await;
        assert!(rows.is_empty());
        assert!(source.calls.borrow().is_empty());
    }
}
