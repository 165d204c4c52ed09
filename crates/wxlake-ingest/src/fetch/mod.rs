//! Cursor fetch engine
//!
//! Pulls history pages per (location, category) pair, groups the records by
//! calendar date, stamps them with provenance and writes each day as one
//! batch to every configured destination.

pub mod cursor;
pub mod engine;

pub use cursor::{record_timestamp, Cursor};
pub use engine::{FetchEngine, PairSummary, RunSummary};

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use wxlake_common::types::stamp;
use wxlake_common::{Record, Timestamp};

/// Provenance written onto every persisted record
#[derive(Debug, Clone)]
pub struct Stamp {
    pub source: String,
    pub run_id: String,
    pub ingested_at: Timestamp,
}

impl Stamp {
    pub fn apply(&self, record: &mut Record) {
        record.insert(stamp::SOURCE.to_string(), Value::String(self.source.clone()));
        record.insert(stamp::RUN_ID.to_string(), Value::String(self.run_id.clone()));
        record.insert(stamp::INGESTED_AT.to_string(), Value::String(self.ingested_at.to_string()));
    }
}

/// Group dated records into per-day batches, keeping their order within a day
pub fn group_by_date(records: Vec<(NaiveDate, Record)>) -> BTreeMap<NaiveDate, Vec<Record>> {
    let mut batches: BTreeMap<NaiveDate, Vec<Record>> = BTreeMap::new();
    for (date, record) in records {
        batches.entry(date).or_default().push(record);
    }
    batches
}
