//! Common types used across wxlake

use crate::error::{Result, WxError};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Display format for timestamps (`2025-01-03 14:00:00`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Calendar date format used for partitions (`2025-01-03`)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A raw record: one JSON object as returned by the upstream API
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Records that share one calendar date, one location and one data category
pub type Batch = Vec<Record>;

/// Field names stamped onto every persisted record
pub mod stamp {
    /// Upstream source tag, e.g. `openweather/weather`
    pub const SOURCE: &str = "_source";
    /// Identifier of the ingestion run that wrote the record
    pub const RUN_ID: &str = "_run_id";
    /// Ingestion timestamp of the run
    pub const INGESTED_AT: &str = "_ingested_at";
}

/// A point in time, always held in UTC.
///
/// Equality and ordering compare the instant only, so two values parsed from
/// different textual forms of the same moment are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Build from Unix epoch seconds
    pub fn from_unix(seconds: i64) -> Result<Self> {
        Utc.timestamp_opt(seconds, 0)
            .single()
            .map(Self)
            .ok_or_else(|| WxError::parse(format!("Unix timestamp out of range: {}", seconds)))
    }

    /// Midnight at the start of the given calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }

    /// Parse `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`, RFC 3339 or integer Unix seconds
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();

        if let Ok(dt) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
            return Ok(Self(Utc.from_utc_datetime(&dt)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
            return Ok(Self::from_date(date));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        if let Ok(seconds) = value.parse::<i64>() {
            return Self::from_unix(seconds);
        }

        Err(WxError::parse(format!(
            "Cannot parse '{}' as a timestamp (expected 'YYYY-MM-DD HH:MM:SS')",
            value
        )))
    }

    /// Interpret a JSON value (integer seconds or a string) as a timestamp
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(seconds) => Self::from_unix(seconds),
                None => Err(WxError::parse(format!("Timestamp is not an integer: {}", n))),
            },
            serde_json::Value::String(s) => Self::parse(s),
            other => Err(WxError::parse(format!("Unexpected timestamp value: {}", other))),
        }
    }

    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Calendar date as `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.0.format(DATE_FORMAT).to_string()
    }

    pub fn start_of_day(&self) -> Self {
        Self::from_date(self.date())
    }

    /// Last whole second of the same calendar day
    pub fn end_of_day(&self) -> Self {
        let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Self(Utc.from_utc_datetime(&self.date().and_time(end)))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl std::str::FromStr for Timestamp {
    type Err = WxError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}
