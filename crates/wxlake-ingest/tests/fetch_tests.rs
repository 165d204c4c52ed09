//! End-to-end fetch engine tests against a mock OpenWeather API

mod common;

use common::*;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wxlake_ingest::api::Endpoint;
use wxlake_ingest::config::RunConfig;
use wxlake_ingest::destination::{Destination, LocalDirectory};
use wxlake_ingest::fetch::FetchEngine;
use wxlake_ingest::WxError;

fn run_config(start: Option<&str>, end: &str, endpoints: Vec<Endpoint>) -> RunConfig {
    RunConfig {
        start: start.map(ts),
        end: ts(end),
        endpoints,
        run_id: "run-fixed".to_string(),
        ingested_at: ts("2025-02-01 08:00:00"),
        concurrency: 1,
    }
}

fn engine(server: &MockServer, root: &std::path::Path, config: RunConfig) -> FetchEngine {
    let destination: Arc<dyn Destination> = Arc::new(LocalDirectory::new(root).unwrap());
    FetchEngine::new(client_for(server), vec![destination], config).unwrap()
}

#[tokio::test]
async fn test_one_batch_per_day_before_the_end_date() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();

    let summary = engine(
        &server,
        dir.path(),
        run_config(Some("2025-01-01 00:00:00"), "2025-01-10 12:00:00", vec![Endpoint::Weather]),
    )
    .run(&[location("Oslo")])
    .await
    .unwrap();

    let expected: Vec<String> =
        (1..=9).map(|day| format!("weather/2025-01-{:02}/Oslo.json", day)).collect();
    assert_eq!(files_under(dir.path()), expected);
    assert_eq!(summary.total_records(), 9 * 24);

    for key in &expected {
        let batch = read_json(&dir.path().join(key));
        let records = batch.as_array().unwrap();
        assert_eq!(records.len(), 24, "{} should hold a full day", key);
        assert_eq!(records[0]["_source"], "openweather/weather");
        assert_eq!(records[0]["_run_id"], "run-fixed");
        assert_eq!(records[0]["_ingested_at"], "2025-02-01 08:00:00");
    }
}

#[tokio::test]
async fn test_rerun_with_same_stamp_is_byte_identical() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();
    let config = run_config(Some("2025-01-01 00:00:00"), "2025-01-05 00:00:00", Endpoint::all().to_vec());

    engine(&server, dir.path(), config.clone()).run(&[location("Oslo")]).await.unwrap();
    let first: Vec<(String, Vec<u8>)> = files_under(dir.path())
        .into_iter()
        .map(|key| {
            let bytes = std::fs::read(dir.path().join(&key)).unwrap();
            (key, bytes)
        })
        .collect();

    engine(&server, dir.path(), config).run(&[location("Oslo")]).await.unwrap();

    assert_eq!(first.len(), 8);
    for (key, bytes) in first {
        assert_eq!(std::fs::read(dir.path().join(&key)).unwrap(), bytes, "{} changed", key);
    }
}

#[tokio::test]
async fn test_resumes_the_day_after_the_earliest_watermark() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();

    engine(
        &server,
        dir.path(),
        run_config(Some("2025-01-01 00:00:00"), "2025-01-03 00:00:00", vec![Endpoint::Weather]),
    )
    .run(&[location("Oslo")])
    .await
    .unwrap();
    let before = server.received_requests().await.unwrap().len();

    let resumed = engine(
        &server,
        dir.path(),
        run_config(None, "2025-01-05 00:00:00", vec![Endpoint::Weather]),
    );
    assert_eq!(resumed.resolve_start().await.unwrap(), ts("2025-01-03 00:00:00"));
    resumed.run(&[location("Oslo")]).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let first_resumed = &requests[before];
    let start = first_resumed
        .url
        .query_pairs()
        .find(|(k, _)| k == "start")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(start, ts("2025-01-03 00:00:00").unix().to_string());

    let expected: Vec<String> =
        (1..=4).map(|day| format!("weather/2025-01-{:02}/Oslo.json", day)).collect();
    assert_eq!(files_under(dir.path()), expected);
}

#[tokio::test]
async fn test_no_start_and_no_watermark_is_config_error() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();

    let err = engine(&server, dir.path(), run_config(None, "2025-01-05 00:00:00", Endpoint::all().to_vec()))
        .run(&[location("Oslo")])
        .await
        .unwrap_err();

    assert!(matches!(err, WxError::Config(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pin_start_fails_before_any_request() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("raw");

    let mut engine = engine(&server, &root, run_config(None, "2025-01-05 00:00:00", vec![Endpoint::Weather]));
    let err = engine.pin_start().await.unwrap_err();

    assert!(matches!(err, WxError::Config(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!root.exists());
}

#[tokio::test]
async fn test_pinned_start_is_used_by_run() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();
    let config = run_config(Some("2025-01-01 00:00:00"), "2025-01-03 00:00:00", vec![Endpoint::Weather]);
    engine(&server, dir.path(), config).run(&[location("Oslo")]).await.unwrap();

    let mut resumed = engine(&server, dir.path(), run_config(None, "2025-01-05 00:00:00", vec![Endpoint::Weather]));
    assert_eq!(resumed.pin_start().await.unwrap(), ts("2025-01-03 00:00:00"));
    resumed.run(&[location("Oslo")]).await.unwrap();

    let expected: Vec<String> =
        (1..=4).map(|day| format!("weather/2025-01-{:02}/Oslo.json", day)).collect();
    assert_eq!(files_under(dir.path()), expected);
}

/// Every record sits in the folder of its own date and no `dt` is stored twice
fn assert_partitioned_without_duplicates(root: &std::path::Path, keys: &[String]) {
    let mut seen = std::collections::HashSet::new();
    for key in keys {
        let folder = key.split('/').nth(1).unwrap();
        for record in read_json(&root.join(key)).as_array().unwrap() {
            let dt = record["dt"].as_i64().unwrap();
            let date = wxlake_common::Timestamp::from_unix(dt).unwrap().date_string();
            assert_eq!(date, folder, "record {} stored under {}", dt, key);
            assert!(seen.insert(dt), "record {} stored twice", dt);
        }
    }
}

#[tokio::test]
async fn test_pages_ending_mid_day_keep_one_batch_per_date() {
    let server = MockServer::start().await;
    mount_history_with(&server, mid_day_page).await;
    let dir = TempDir::new().unwrap();

    engine(
        &server,
        dir.path(),
        run_config(Some("2025-01-01 00:00:00"), "2025-01-10 12:00:00", vec![Endpoint::Weather]),
    )
    .run(&[location("Oslo")])
    .await
    .unwrap();

    let expected: Vec<String> =
        (1..=9).map(|day| format!("weather/2025-01-{:02}/Oslo.json", day)).collect();
    assert_eq!(files_under(dir.path()), expected);
    assert_partitioned_without_duplicates(dir.path(), &expected);
}

#[tokio::test]
async fn test_records_past_the_end_are_not_stored() {
    let server = MockServer::start().await;
    mount_history_with(&server, overshooting_page).await;
    let dir = TempDir::new().unwrap();

    let summary = engine(
        &server,
        dir.path(),
        run_config(Some("2025-01-01 00:00:00"), "2025-01-05 12:00:00", vec![Endpoint::Weather]),
    )
    .run(&[location("Oslo")])
    .await
    .unwrap();

    let expected: Vec<String> =
        (1..=4).map(|day| format!("weather/2025-01-{:02}/Oslo.json", day)).collect();
    assert_eq!(files_under(dir.path()), expected);
    assert_eq!(summary.total_records(), 4 * 24);
    assert_partitioned_without_duplicates(dir.path(), &expected);
}

#[tokio::test]
async fn test_server_error_aborts_run_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/history/city"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("raw");

    let err = engine(
        &server,
        &root,
        run_config(Some("2025-01-01 00:00:00"), "2025-01-05 00:00:00", vec![Endpoint::Weather]),
    )
    .run(&[location("Oslo")])
    .await
    .unwrap_err();

    assert!(matches!(err, WxError::Transport(_)));
    assert!(!err.to_string().contains("test-secret"));
    assert!(!root.exists());
}

#[tokio::test]
async fn test_concurrent_pairs_write_every_location() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let dir = TempDir::new().unwrap();

    let mut config = run_config(Some("2025-01-01 00:00:00"), "2025-01-03 00:00:00", Endpoint::all().to_vec());
    config.concurrency = 4;

    let summary = engine(&server, dir.path(), config)
        .run(&[location("Oslo"), location("Bergen")])
        .await
        .unwrap();

    assert_eq!(summary.pairs.len(), 4);
    let files = files_under(dir.path());
    assert_eq!(files.len(), 8);
    for category in ["weather", "air_pollution"] {
        for city in ["Oslo", "Bergen"] {
            for day in ["2025-01-01", "2025-01-02"] {
                assert!(files.contains(&format!("{}/{}/{}.json", category, day, city)));
            }
        }
    }
}
