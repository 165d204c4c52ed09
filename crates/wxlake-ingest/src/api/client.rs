//! HTTP API client for OpenWeather
//!
//! Requests are paced by a shared `governor` limiter and never retried;
//! a failure surfaces as a transport error and aborts the caller's run.

use crate::api::{endpoints, types::*, Endpoint};
use crate::config::ApiConfig;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Url};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, instrument};
use wxlake_common::{Record, Result, Timestamp, WxError};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// API client shared by every fetch loop of a run
#[derive(Clone)]
pub struct OpenWeatherClient {
    client: Client,
    config: ApiConfig,
    limiter: Arc<DirectRateLimiter>,
}

impl OpenWeatherClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| WxError::transport(format!("Failed to build HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute)
            .ok_or_else(|| WxError::config("requests_per_minute must be greater than zero"))?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            config,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Fetch one page of history records between `start` and `end`
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    pub async fn fetch_page(
        &self,
        endpoint: Endpoint,
        coordinates: Coordinates,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Record>> {
        let url = endpoints::history_url(&self.config, endpoint, coordinates, start, end)?;
        let body: serde_json::Value = self.get_json(url).await?;
        let records = page_records(body)?;

        debug!(records = records.len(), "Received page");
        Ok(records)
    }

    /// Look up coordinates for a free-text query; `None` when nothing matched
    #[instrument(skip(self))]
    pub async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let url = endpoints::geocoding_url(&self.config, query)?;
        let hits: Vec<GeocodingHit> = self.get_json(url).await?;

        Ok(hits.first().map(GeocodingHit::coordinates))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.limiter.until_ready().await;

        let shown = endpoints::redacted(&url);
        debug!(url = %shown, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WxError::transport(format!("GET {} failed: {}", shown, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WxError::transport(format!(
                "GET {} returned {}: {}",
                shown,
                status,
                body.trim()
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            WxError::transport(format!("Failed to read response from {}: {}", shown, e.without_url()))
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| WxError::parse(format!("Invalid JSON from {}: {}", shown, e)))
    }
}
