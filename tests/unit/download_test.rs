//! Unit tests for the download stage

use crate::support::fast_download_config;
use gen_image_pipeline::response::Downloader;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_download_retries_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/1.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = Downloader::new(&fast_download_config(), 4).unwrap();

    let started = Instant::now();
    let file = downloader
        .download(&format!("{}/img/1.jpg", server.uri()), dir.path(), 1)
        .await
        .unwrap();

    assert_eq!(file.attempts, 3);
    // Linear backoff: 5ms after the first failure, 10ms after the second
    assert!(started.elapsed() >= Duration::from_millis(15));
    assert_eq!(std::fs::read(&file.local_path).unwrap(), b"image");
}

#[tokio::test]
async fn test_download_gives_up_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = Downloader::new(&fast_download_config(), 4).unwrap();

    let result = downloader
        .download(&format!("{}/img/7.jpg", server.uri()), dir.path(), 7)
        .await;

    assert!(result.is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_creates_directory_and_names_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let downloader = Downloader::new(&fast_download_config(), 4).unwrap();

    let file = downloader
        .download(&format!("{}/img/12.jpg", server.uri()), &nested, 12)
        .await
        .unwrap();

    assert_eq!(file.attempts, 1);
    assert_eq!(file.local_path.parent(), Some(nested.as_path()));

    let name = file.local_path.file_name().unwrap().to_string_lossy().to_string();
    let parts: Vec<&str> = name.trim_end_matches(".jpg").split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "seedream");
    assert!(parts[1].parse::<i64>().is_ok());
    assert_eq!(parts[2], "12");
}

#[tokio::test]
async fn test_download_slots_serialise_transfers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"x".to_vec())
                .set_delay(Duration::from_millis(100)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = Downloader::new(&fast_download_config(), 1).unwrap();
    assert_eq!(downloader.available_slots(), 1);

    let base = server.uri();
    let started = Instant::now();
    let results = futures::future::join_all((1..=3).map(|i| {
        let url = format!("{}/img/{}.jpg", base, i);
        let downloader = &downloader;
        let dir = dir.path();
        async move { downloader.download(&url, dir, i).await }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(downloader.available_slots(), 1);
}
