//! Shared helpers for wxlake-ingest integration tests
//!
//! The OpenWeather API is simulated by a `wiremock` server whose history
//! endpoints answer with hourly records between the requested `start` and
//! `end`, cut into pages of one to three whole days depending on the start day.
//! [`mid_day_page`] and [`overshooting_page`] break those assumptions.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};
use wxlake_common::Timestamp;
use wxlake_ingest::api::{Coordinates, OpenWeatherClient};
use wxlake_ingest::config::ApiConfig;
use wxlake_ingest::locations::ResolvedLocation;

pub const HOUR: i64 = 3600;
pub const DAY: i64 = 24 * HOUR;

pub fn ts(value: &str) -> Timestamp {
    Timestamp::parse(value).expect("valid timestamp")
}

/// Client pointed at `server` with a budget that never throttles tests
pub fn client_for(server: &MockServer) -> OpenWeatherClient {
    let mut config = ApiConfig::new("test-secret").with_base_url(&server.uri());
    config.requests_per_minute = 100_000;
    OpenWeatherClient::new(config).expect("client")
}

pub fn location(key: &str) -> ResolvedLocation {
    ResolvedLocation {
        key: key.to_string(),
        coordinates: Coordinates { lat: 59.91, lon: 10.75 },
    }
}

fn query(request: &Request) -> HashMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

/// Hourly records from `start` up to and including `end`, limited to a page
/// of one to three whole days
pub fn history_page(request: &Request) -> ResponseTemplate {
    let params = query(request);
    let start: i64 = params["start"].parse().unwrap();
    let end: i64 = params["end"].parse().unwrap();

    let page_days = 1 + (start / DAY) % 3;
    let page_end = end.min(start + page_days * DAY - HOUR);

    let list: Vec<serde_json::Value> = (start..=page_end)
        .step_by(HOUR as usize)
        .map(|dt| {
            json!({
                "dt": dt,
                "main": {"temp": 270.0 + (dt % 10) as f64, "humidity": 80},
                "weather": [{"id": 800, "main": "Clear"}]
            })
        })
        .collect();

    ResponseTemplate::new(200).set_body_json(json!({"cod": "200", "cnt": list.len(), "list": list}))
}

/// Hourly records from `from` through `through`, both inclusive
fn hourly_page(from: i64, through: i64) -> ResponseTemplate {
    let list: Vec<serde_json::Value> = (from..=through)
        .step_by(HOUR as usize)
        .map(|dt| json!({"dt": dt, "main": {"temp": 270.0 + (dt % 10) as f64}}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({"cod": "200", "cnt": list.len(), "list": list}))
}

/// Pages of thirty hours, so every page stops partway into its second day
pub fn mid_day_page(request: &Request) -> ResponseTemplate {
    let params = query(request);
    let start: i64 = params["start"].parse().unwrap();
    let end: i64 = params["end"].parse().unwrap();
    hourly_page(start, end.min(start + 29 * HOUR))
}

/// Three whole days per page, ignoring the requested `end`
pub fn overshooting_page(request: &Request) -> ResponseTemplate {
    let start: i64 = query(request)["start"].parse().unwrap();
    hourly_page(start, start + 3 * DAY - HOUR)
}

/// Serve both history endpoints from `history_page`
pub async fn mount_history(server: &MockServer) {
    mount_history_with(server, history_page).await;
}

/// Serve both history endpoints from `responder`
pub async fn mount_history_with(server: &MockServer, responder: fn(&Request) -> ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/data/2.5/history/city"))
        .respond_with(responder)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution/history"))
        .respond_with(responder)
        .mount(server)
        .await;
}

/// Relative keys of every file under `root`, sorted
pub fn files_under(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}
