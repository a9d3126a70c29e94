use crate::cache::key::CacheKey;
use crate::cache::store::{CacheStore, FsStore};
use crate::cache::ResultCache;
use crate::portal::error::PortalError;
use crate::portal::retry::RetryPolicy;
use crate::portal::transport::{HttpTransport, Transport};
use crate::portal::values::{ValueQuery, ValueSeries, ValueSource};
use chrono::Local;
use log::info;
use reqwest::Url;
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub const DEFAULT_BASE_URL: &str = "https://rtdms.cpcb.gov.in/api";

const STATES_PATH: &str = "getAllState";
const CITIES_PATH: &str = "getAllCity";
const INDUSTRIES_PATH: &str = "industryList";
const ACTIVE_INDUSTRIES_PATH: &str = "industryListStatus";
const INDUSTRY_DETAILS_PATH: &str = "getIndustryDetails";
const THRESHOLDS_PATH: &str = "getStationParameterLimits";
const VALUES_PATH: &str = "stationDeviceData";
// Category segment the portal expects in industry listings.
const INDUSTRY_CATEGORY: &str = "45";

/// Client for the portal's JSON API.
///
/// Every reference lookup is memoised through a [`ResultCache`] and executed under the
/// configured [`RetryPolicy`]. Value queries are memoised per calendar day when
/// `cache_values` is set.
pub struct PortalClient<T = HttpTransport, S = FsStore> {
    transport: T,
    cache: ResultCache<S>,
    base_url: String,
    retry: RetryPolicy,
    avg_window_minutes: u32,
    cache_values: bool,
}

impl<T: Transport, S: CacheStore> PortalClient<T, S> {
    pub fn new(
        transport: T,
        store: S,
        base_url: &str,
        retry: RetryPolicy,
        avg_window_minutes: u32,
        cache_values: bool,
    ) -> Self {
        Self {
            transport,
            cache: ResultCache::new(store),
            base_url: base_url.to_string(),
            retry,
            avg_window_minutes,
            cache_values,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &ResultCache<S> {
        &self.cache
    }

    fn url(&self, segments: &[&str]) -> Result<String, PortalError> {
        let invalid = || PortalError::UnexpectedShape {
            url: self.base_url.clone(),
            message: "base URL cannot carry path segments".to_string(),
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    async fn cached_get(&self, key: CacheKey, url: String) -> Result<Value, PortalError> {
        let label = key.path();
        let (url, label) = (&url, &label);
        self.cache
            .get_or_compute(&key, move || {
                self.retry
                    .run(label, move || self.transport.get_json(url))
            })
            .await
    }

    async fn cached_list(&self, key: CacheKey, url: String) -> Result<Vec<Value>, PortalError> {
        let payload = self.cached_get(key, url.clone()).await?;
        into_list(&url, payload)
    }

    pub async fn states(&self) -> Result<Vec<Value>, PortalError> {
        let url = self.url(&[STATES_PATH])?;
        self.cached_list(CacheKey::States, url).await
    }

    pub async fn cities(&self, state_id: &str) -> Result<Vec<Value>, PortalError> {
        let url = self.url(&[CITIES_PATH, state_id])?;
        let key = CacheKey::Cities {
            state_id: state_id.to_string(),
        };
        self.cached_list(key, url).await
    }

    /// Every city of every state. City records carry their state id as `id` and the
    /// city name as `city`.
    pub async fn all_cities(&self) -> Result<Vec<Value>, PortalError> {
        let key = CacheKey::AllCities;
        self.cache
            .get_or_compute(&key, move || async move {
                let mut cities = Vec::new();
                for state in self.states().await? {
                    let Some(state_id) = state.get("id").and_then(scalar_to_string) else {
                        continue;
                    };
                    cities.extend(self.cities(&state_id).await?);
                }
                info!("Found {} cities", cities.len());
                Ok::<_, PortalError>(cities)
            })
            .await
    }

    pub async fn industries(&self, state_id: &str, city: &str) -> Result<Vec<Value>, PortalError> {
        let url = self.url(&[INDUSTRIES_PATH, INDUSTRY_CATEGORY, state_id, city])?;
        let key = CacheKey::Industries {
            state_id: state_id.to_string(),
            city: city.to_string(),
        };
        self.cached_list(key, url).await
    }

    async fn active_industries(
        &self,
        state_id: &str,
        city: &str,
    ) -> Result<Vec<Value>, PortalError> {
        let url = self.url(&[ACTIVE_INDUSTRIES_PATH, INDUSTRY_CATEGORY, state_id, city])?;
        let key = CacheKey::ActiveIndustries {
            state_id: state_id.to_string(),
            city: city.to_string(),
        };
        self.cached_list(key, url).await
    }

    /// Industry list records for every city.
    pub async fn all_industries(&self) -> Result<Vec<Value>, PortalError> {
        let key = CacheKey::AllIndustries;
        self.cache
            .get_or_compute(&key, move || async move {
                let mut industries = Vec::new();
                for (state_id, city) in city_pairs(&self.all_cities().await?) {
                    industries.extend(self.industries(&state_id, &city).await?);
                }
                info!("Found {} industries", industries.len());
                Ok::<_, PortalError>(industries)
            })
            .await
    }

    /// Ids of all industries currently reporting data.
    pub async fn active_industry_ids(&self) -> Result<BTreeSet<i64>, PortalError> {
        let mut active = BTreeSet::new();
        for (state_id, city) in city_pairs(&self.all_cities().await?) {
            active.extend(
                self.active_industries(&state_id, &city)
                    .await?
                    .iter()
                    .filter_map(|record| record.get("id").and_then(scalar_to_i64)),
            );
        }
        Ok(active)
    }

    /// Raw station/device/parameter metadata of one industry.
    pub async fn industry_metadata(&self, industry_id: i64) -> Result<Value, PortalError> {
        let url = self.url(&[INDUSTRY_DETAILS_PATH, &industry_id.to_string()])?;
        self.cached_get(CacheKey::IndustryMetadata { industry_id }, url)
            .await
    }

    /// Raw parameter threshold listing used to build a [`crate::ThresholdTable`].
    pub async fn thresholds(&self) -> Result<Value, PortalError> {
        let url = self.url(&[THRESHOLDS_PATH])?;
        self.cached_get(CacheKey::Thresholds, url).await
    }
}

impl<T: Transport, S: CacheStore> ValueSource for PortalClient<T, S> {
    async fn fetch_values(&self, query: &ValueQuery<'_>) -> Result<ValueSeries, PortalError> {
        let url = self.url(&[
            VALUES_PATH,
            &query.industry_id.to_string(),
            query.station_id,
            query.device_id,
        ])?;
        let body = json!({
            "avg": self.avg_window_minutes,
            "param": query.param_key,
            "startDate": query.start.to_string(),
        });
        let label = query.to_string();
        let (url, body, label) = (&url, &body, &label);

        let fetch = move || {
            self.retry.run(label, move || async move {
                let payload = self.transport.post_json(url, body).await?;
                ValueSeries::from_response(url, &payload)
            })
        };

        if !self.cache_values {
            return fetch().await;
        }
        let key = CacheKey::Values {
            date: Local::now().date_naive(),
            industry_id: query.industry_id,
            station_id: query.station_id.to_string(),
            device_id: query.device_id.to_string(),
            param_key: query.param_key.to_string(),
            start: query.start,
        };
        self.cache.get_or_compute(&key, fetch).await
    }
}

fn into_list(url: &str, payload: Value) -> Result<Vec<Value>, PortalError> {
    match payload {
        Value::Array(items) => Ok(items),
        other => Err(PortalError::UnexpectedShape {
            url: url.to_string(),
            message: format!("expected a list, got {}", json_kind(&other)),
        }),
    }
}

fn city_pairs(cities: &[Value]) -> Vec<(String, String)> {
    cities
        .iter()
        .filter_map(|city| {
            let state_id = city.get("id").and_then(scalar_to_string)?;
            let name = city.get("city").and_then(scalar_to_string)?;
            Some((state_id, name))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Renders a JSON scalar the way the portal's ids appear in URLs.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn scalar_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
