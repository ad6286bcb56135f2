//! HTTP client tests against a local mock server.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use logrelay_upload::{
    DetailFetchConfig, DetailFetcher, DetailSource, ReportClient, UploadQueue, UploadQueueConfig,
    UploadTransport,
};
use mockito::Matcher;

fn log_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("20240101-120000.zevtc");
    std::fs::write(&path, b"EVTC20240101").unwrap();
    path
}

#[tokio::test]
async fn test_upload_maps_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/uploadContent")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="json""#.to_string()),
            Matcher::Regex(r#"name="generator""#.to_string()),
            Matcher::Regex(r#"name="detailedwvw""#.to_string()),
            Matcher::Regex(r#"filename="20240101-120000.zevtc""#.to_string()),
            Matcher::Regex("EVTC20240101".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"abcd","permalink":"https://dps.report/abcd-20240101-120000_sab",
                "userToken":"tok","uploadTime":1704110400,
                "encounter":{"duration":"4m 10s","boss":"Sabetha"}}"#,
        )
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = ReportClient::new();
    let endpoint = format!("{}/uploadContent", server.url());
    let response = client.submit(&endpoint, &log_file(&dir), None).await.unwrap();
    let result = response.into_result(chrono::Utc::now());

    mock.assert_async().await;
    assert_eq!(result.id, "abcd");
    assert_eq!(result.upload_time, Some(1_704_110_400));
    assert_eq!(result.fight_name.as_deref(), Some("Sabetha"));
    assert_eq!(result.encounter_duration.as_deref(), Some("4m 10s"));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/uploadContent")
        .with_status(429)
        .with_header("retry-after", "12")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let endpoint = format!("{}/uploadContent", server.url());
    let err = ReportClient::new()
        .submit(&endpoint, &log_file(&dir), Some("tok"))
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after, Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn test_fetch_detail_queries_by_trailing_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/getJson")
        .match_query(Matcher::UrlEncoded("permalink".into(), "abcd-20240101".into()))
        .with_status(200)
        .with_body(r#"{"eliteInsightsVersion":"3.18.1.0","players":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ReportClient::new().with_detail_base(&server.url());
    let fetcher = DetailFetcher::new(Arc::new(client), DetailFetchConfig::default());

    let outcome = fetcher.fetch_detail("https://dps.report/abcd-20240101").await;
    mock.assert_async().await;
    assert_eq!(outcome.document().unwrap()["eliteInsightsVersion"], "3.18.1.0");
}

#[tokio::test]
async fn test_detail_request_times_out() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/getJson")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(2));
            w.write_all(b"{}")
        })
        .create_async()
        .await;

    let client = ReportClient::new()
        .with_detail_base(&server.url())
        .with_detail_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let err = client.get("stuck-1").await.unwrap_err();
    assert!(err.status.is_none());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_queue_fails_over_to_backup_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let primary = server
        .mock("POST", "/a")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let backup = server
        .mock("POST", "/b")
        .with_status(200)
        .with_body(r#"{"id":"x","permalink":"https://dps.report/x"}"#)
        .expect(1)
        .create_async()
        .await;

    let queue = UploadQueue::new(
        Arc::new(ReportClient::new()),
        UploadQueueConfig {
            base_backoff: Duration::from_millis(10),
            endpoints: vec![format!("{}/a", server.url()), format!("{}/b", server.url())],
            ..UploadQueueConfig::default()
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let result = queue.upload(log_file(&dir)).await;

    primary.assert_async().await;
    backup.assert_async().await;
    assert!(result.is_success());
    assert_eq!(result.permalink, "https://dps.report/x");
}
