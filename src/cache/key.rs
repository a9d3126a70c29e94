use crate::types::relative_start::RelativeStart;
use chrono::NaiveDate;
use std::fmt;

/// Identifies one memoised portal result.
///
/// The key is derived only from call parameters; [`CacheKey::path`] turns it into the
/// relative storage path used by every [`crate::CacheStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    States,
    Cities {
        state_id: String,
    },
    AllCities,
    Industries {
        state_id: String,
        city: String,
    },
    ActiveIndustries {
        state_id: String,
        city: String,
    },
    AllIndustries,
    IndustryMetadata {
        industry_id: i64,
    },
    Thresholds,
    Values {
        date: NaiveDate,
        industry_id: i64,
        station_id: String,
        device_id: String,
        param_key: String,
        start: RelativeStart,
    },
}

impl CacheKey {
    pub fn path(&self) -> String {
        match self {
            CacheKey::States => "states.json".to_string(),
            CacheKey::Cities { state_id } => {
                format!("state-{}-cities.json", sanitize_component(state_id))
            }
            CacheKey::AllCities => "cities.json".to_string(),
            CacheKey::Industries { state_id, city } => format!(
                "industries-{}-{}.json",
                sanitize_component(state_id),
                sanitize_component(city)
            ),
            CacheKey::ActiveIndustries { state_id, city } => format!(
                "industries-active/{}-{}.json",
                sanitize_component(state_id),
                sanitize_component(city)
            ),
            CacheKey::AllIndustries => "industries.json".to_string(),
            CacheKey::IndustryMetadata { industry_id } => format!("industry-{industry_id}.json"),
            CacheKey::Thresholds => "thresholds.json".to_string(),
            CacheKey::Values {
                date,
                industry_id,
                station_id,
                device_id,
                param_key,
                start,
            } => format!(
                "values/{}/{}/{}-{}-{}-{}.json",
                date.format("%Y-%m-%d"),
                industry_id,
                sanitize_component(station_id),
                sanitize_component(device_id),
                sanitize_component(param_key),
                start.slug()
            ),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Makes an arbitrary upstream value safe to embed in a single path component.
pub(crate) fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_keys() {
        assert_eq!(CacheKey::States.path(), "states.json");
        assert_eq!(
            CacheKey::Cities {
                state_id: "21".into()
            }
            .path(),
            "state-21-cities.json"
        );
        assert_eq!(
            CacheKey::ActiveIndustries {
                state_id: "21".into(),
                city: "Navi Mumbai".into()
            }
            .path(),
            "industries-active/21-Navi Mumbai.json"
        );
        assert_eq!(
            CacheKey::IndustryMetadata { industry_id: 1234 }.path(),
            "industry-1234.json"
        );
    }

    #[test]
    fn test_values_key_includes_every_parameter() {
        let key = CacheKey::Values {
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            industry_id: 77,
            station_id: "site_5".into(),
            device_id: "dev/1".into(),
            param_key: "pm".into(),
            start: RelativeStart::years(10),
        };
        assert_eq!(key.path(), "values/2024-03-09/77/site_5-dev_1-pm-10y.json");
    }

    #[test]
    fn test_sanitize_component_blocks_traversal() {
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("a/../b"), "a_.._b");
        assert_eq!(sanitize_component("  "), "_");
    }
}
