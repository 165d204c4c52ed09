//! Run orchestration for the fetch engine

use super::{group_by_date, Cursor, Stamp};
use crate::api::{Endpoint, OpenWeatherClient};
use crate::config::{check_date_range, RunConfig};
use crate::destination::{batch_key, Destination};
use crate::locations::ResolvedLocation;
use chrono::{Duration, NaiveDate};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use wxlake_common::{Record, Result, Timestamp, WxError};

/// Outcome of one (location, category) fetch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSummary {
    pub location: String,
    pub endpoint: Endpoint,
    pub pages: usize,
    pub batches: usize,
    pub records: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub pairs: Vec<PairSummary>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.pairs.iter().map(|p| p.records).sum()
    }
}

pub struct FetchEngine {
    client: OpenWeatherClient,
    destinations: Vec<Arc<dyn Destination>>,
    config: RunConfig,
}

impl FetchEngine {
    pub fn new(
        client: OpenWeatherClient,
        destinations: Vec<Arc<dyn Destination>>,
        config: RunConfig,
    ) -> Result<Self> {
        if destinations.is_empty() {
            return Err(WxError::config("No destination configured"));
        }
        config.validate()?;

        Ok(Self { client, destinations, config })
    }

    /// Effective start: the explicit start date, else the day after the
    /// earliest watermark of the selected categories across all destinations.
    pub async fn resolve_start(&self) -> Result<Timestamp> {
        let start = match self.config.start {
            Some(start) => start,
            None => {
                let earliest = self.earliest_watermark().await?.ok_or_else(|| {
                    WxError::config(
                        "No start date given and no destination holds prior data; \
                         pass --start-date for the first run",
                    )
                })?;
                info!(watermark = %earliest, "Resuming from watermark");
                Timestamp::from_date(earliest) + Duration::days(1)
            }
        };

        check_date_range(start, self.config.end)?;
        Ok(start)
    }

    /// Resolve the effective start once and keep it for [`run`](Self::run).
    ///
    /// Lets callers surface a missing start date before any API traffic.
    /// Destinations are cleaned up when no start can be determined.
    pub async fn pin_start(&mut self) -> Result<Timestamp> {
        match self.resolve_start().await {
            Ok(start) => {
                self.config.start = Some(start);
                Ok(start)
            }
            Err(e) => {
                self.clean_up().await;
                Err(e)
            }
        }
    }

    /// Remove empty partitions from every destination
    pub async fn clean_up(&self) {
        futures::future::join_all(self.destinations.iter().map(|d| d.clean_up())).await;
    }

    async fn earliest_watermark(&self) -> Result<Option<NaiveDate>> {
        let mut earliest: Option<NaiveDate> = None;

        for destination in &self.destinations {
            let watermarks = destination.last_persisted_dates().await?;
            debug!(destination = destination.name(), ?watermarks, "Watermarks");

            for endpoint in &self.config.endpoints {
                if let Some(date) = watermarks.get(endpoint.name()) {
                    earliest = Some(earliest.map_or(*date, |e| e.min(*date)));
                }
            }
        }

        Ok(earliest)
    }

    /// Fetch every (location, category) pair, then clean up every destination
    /// whether or not the fetch succeeded.
    #[instrument(skip(self, locations), fields(run_id = %self.config.run_id))]
    pub async fn run(&self, locations: &[ResolvedLocation]) -> Result<RunSummary> {
        let result = self.fetch_all(locations).await;
        self.clean_up().await;

        match &result {
            Ok(summary) => info!(
                pairs = summary.pairs.len(),
                records = summary.total_records(),
                "Ingestion run finished"
            ),
            Err(e) => warn!(error = %e, "Ingestion run aborted"),
        }
        result
    }

    async fn fetch_all(&self, locations: &[ResolvedLocation]) -> Result<RunSummary> {
        let start = self.resolve_start().await?;
        info!(start = %start, end = %self.config.end, locations = locations.len(), "Starting ingestion");

        let pairs: Vec<(&ResolvedLocation, Endpoint)> = locations
            .iter()
            .flat_map(|location| self.config.endpoints.iter().map(move |e| (location, *e)))
            .collect();

        let pairs = futures::stream::iter(pairs)
            .map(|(location, endpoint)| self.fetch_pair(location, endpoint, start))
            .buffer_unordered(self.config.concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(RunSummary {
            run_id: self.config.run_id.clone(),
            start,
            end: self.config.end,
            pairs,
        })
    }

    /// Drive one cursor to completion; pages are requested strictly in order
    #[instrument(skip(self, location, endpoint), fields(location = %location.key, endpoint = %endpoint))]
    async fn fetch_pair(
        &self,
        location: &ResolvedLocation,
        endpoint: Endpoint,
        start: Timestamp,
    ) -> Result<PairSummary> {
        let stamp = Stamp {
            source: endpoint.source_tag(),
            run_id: self.config.run_id.clone(),
            ingested_at: self.config.ingested_at,
        };
        let mut cursor = Cursor::new(start, self.config.end);
        let mut summary = PairSummary {
            location: location.key.clone(),
            endpoint,
            pages: 0,
            batches: 0,
            records: 0,
        };

        while !cursor.is_done() {
            let (from, to) = cursor.window();
            let records = self.client.fetch_page(endpoint, location.coordinates, from, to).await?;
            let received = records.len();
            let kept = cursor.process_page(records)?;
            summary.pages += 1;

            for (date, mut batch) in group_by_date(kept) {
                batch.iter_mut().for_each(|record| stamp.apply(record));
                let key = batch_key(endpoint.name(), date, &location.key);
                self.save_everywhere(&batch, &key).await?;

                summary.batches += 1;
                summary.records += batch.len();
            }

            debug!(from = %from, received, next = %cursor.position(), done = cursor.is_done(), "Processed page");
        }

        info!(
            pages = summary.pages,
            batches = summary.batches,
            records = summary.records,
            "Pair complete"
        );
        Ok(summary)
    }

    /// Write one batch to every destination; the batch counts as persisted
    /// only when all writes succeeded.
    async fn save_everywhere(&self, batch: &[Record], key: &str) -> Result<()> {
        let results = futures::future::join_all(
            self.destinations.iter().map(|destination| destination.save_batch(batch, key)),
        )
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .zip(&self.destinations)
            .filter_map(|(result, destination)| {
                result.err().map(|e| format!("{}: {}", destination.name(), e))
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WxError::transport(format!(
                "Failed to persist {}: {}",
                key,
                failures.join("; ")
            )))
        }
    }
}
