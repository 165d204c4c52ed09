//! Day-granularity fetch cursor for one (location, category) pair

use chrono::{Duration, NaiveDate};
use serde_json::Value;
use wxlake_common::{Record, Result, Timestamp, WxError};

/// Field carrying each record's Unix timestamp
pub const TIMESTAMP_FIELD: &str = "dt";

/// Tracks how far one pair has been fetched.
///
/// Each page is requested from the cursor's start of day up to the run end.
/// Records dated on or after the end date stop the loop and are dropped, so
/// only days strictly before the end date are kept. After every page the
/// cursor moves to the day after the latest record seen (or after itself
/// when the page was empty).
#[derive(Debug, Clone)]
pub struct Cursor {
    cursor: Timestamp,
    end: Timestamp,
    done: bool,
}

impl Cursor {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        let done = start.start_of_day() >= end.start_of_day();
        Self { cursor: start, end, done }
    }

    pub fn position(&self) -> Timestamp {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// `(start, end)` of the next page request
    pub fn window(&self) -> (Timestamp, Timestamp) {
        (self.cursor.start_of_day(), self.end)
    }

    /// Keep the records before the end date, paired with their calendar date,
    /// and advance the cursor.
    pub fn process_page(&mut self, records: Vec<Record>) -> Result<Vec<(NaiveDate, Record)>> {
        let end_date = self.end.date();
        let mut kept = Vec::with_capacity(records.len());
        let mut latest: Option<Timestamp> = None;

        for record in records {
            let ts = record_timestamp(&record)?;
            if ts.date() >= end_date {
                self.done = true;
                break;
            }
            latest = Some(latest.map_or(ts, |l| l.max(ts)));
            kept.push((ts.date(), record));
        }

        let base = latest.map_or(self.cursor, |l| l.max(self.cursor));
        self.cursor = base.start_of_day() + Duration::days(1);

        if self.cursor.start_of_day() >= self.end.start_of_day() {
            self.done = true;
        }

        Ok(kept)
    }
}

/// The record's `dt` as a timestamp; anything but integer seconds is a parse error
pub fn record_timestamp(record: &Record) -> Result<Timestamp> {
    match record.get(TIMESTAMP_FIELD) {
        Some(value @ Value::Number(_)) => Timestamp::from_json(value),
        Some(other) => Err(WxError::parse(format!(
            "Record '{}' is not an integer: {}",
            TIMESTAMP_FIELD, other
        ))),
        None => Err(WxError::parse(format!("Record has no '{}' field", TIMESTAMP_FIELD))),
    }
}
