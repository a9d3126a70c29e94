use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unit of a [`RelativeStart`] marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartUnit {
    Days,
    Months,
    Years,
}

impl StartUnit {
    fn as_str(&self, amount: u32) -> &'static str {
        match (self, amount) {
            (StartUnit::Days, 1) => "day",
            (StartUnit::Days, _) => "days",
            (StartUnit::Months, 1) => "month",
            (StartUnit::Months, _) => "months",
            (StartUnit::Years, 1) => "year",
            (StartUnit::Years, _) => "years",
        }
    }
}

/// Relative start marker sent as `startDate` in time-series queries.
///
/// # Examples
///
/// ```
/// use ocems_harvest::RelativeStart;
///
/// let start: RelativeStart = "10 years ago".parse().unwrap();
/// assert_eq!(start, RelativeStart::years(10));
/// assert_eq!(RelativeStart::days(2).to_string(), "2 days ago");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativeStart {
    pub amount: u32,
    pub unit: StartUnit,
}

impl RelativeStart {
    pub fn days(amount: u32) -> Self {
        Self {
            amount,
            unit: StartUnit::Days,
        }
    }

    pub fn months(amount: u32) -> Self {
        Self {
            amount,
            unit: StartUnit::Months,
        }
    }

    pub fn years(amount: u32) -> Self {
        Self {
            amount,
            unit: StartUnit::Years,
        }
    }

    /// Compact form used in cache keys (`10y`, `2d`).
    pub(crate) fn slug(&self) -> String {
        let unit = match self.unit {
            StartUnit::Days => 'd',
            StartUnit::Months => 'm',
            StartUnit::Years => 'y',
        };
        format!("{}{}", self.amount, unit)
    }
}

impl Default for RelativeStart {
    fn default() -> Self {
        Self::years(10)
    }
}

impl fmt::Display for RelativeStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ago", self.amount, self.unit.as_str(self.amount))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid start marker '{0}', expected something like '2 days ago' or '10 years ago'")]
pub struct ParseRelativeStartError(pub String);

impl FromStr for RelativeStart {
    type Err = ParseRelativeStartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRelativeStartError(s.to_string());
        let mut parts = s.split_whitespace();
        let amount = parts
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(err)?;
        let unit = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("day" | "days") => StartUnit::Days,
            Some("month" | "months") => StartUnit::Months,
            Some("year" | "years") => StartUnit::Years,
            _ => return Err(err()),
        };
        match (parts.next(), parts.next()) {
            (None, None) | (Some("ago"), None) => Ok(Self { amount, unit }),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markers() {
        assert_eq!("2 days ago".parse(), Ok(RelativeStart::days(2)));
        assert_eq!("10 years ago".parse(), Ok(RelativeStart::years(10)));
        assert_eq!("1 month".parse(), Ok(RelativeStart::months(1)));
        assert!("ten years ago".parse::<RelativeStart>().is_err());
        assert!("3 weeks ago".parse::<RelativeStart>().is_err());
        assert!("3 days from now".parse::<RelativeStart>().is_err());
    }

    #[test]
    fn test_display_and_slug() {
        assert_eq!(RelativeStart::years(1).to_string(), "1 year ago");
        assert_eq!(RelativeStart::default().to_string(), "10 years ago");
        assert_eq!(RelativeStart::days(2).slug(), "2d");
    }
}
