//! Functional tests for the REST record store client

use gen_image_pipeline::config::SyncConfig;
use gen_image_pipeline::sync::{HttpRecordStore, RecordFields, RecordStatus, RecordStore};
use gen_image_pipeline::AppError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sync_config(server: &MockServer) -> SyncConfig {
    SyncConfig {
        enabled: true,
        base_url: Some(format!("{}/store/", server.uri())),
        api_token: Some("store-token".to_string()),
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn test_create_and_update_record() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/store/collections/generated_images/records/job-1"))
        .and(header("authorization", "Bearer store-token"))
        .and(body_partial_json(serde_json::json!({ "prompt": "a fox", "status": "pending" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/store/collections/generated_images/records/job-1"))
        .and(body_partial_json(serde_json::json!({ "status": "failed", "error": "boom" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpRecordStore::new(&sync_config(&server)).unwrap();
    assert!(store.is_configured());

    store
        .create_record(
            "job-1",
            RecordFields::new()
                .with("prompt", "a fox")
                .with("status", RecordStatus::Pending),
        )
        .await
        .unwrap();
    store
        .update_record_status(
            "job-1",
            RecordStatus::Failed,
            RecordFields::new().with("error", "boom"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upload_blob_returns_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/store/blobs/seedream_1_1.jpg"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "https://gallery.test/seedream_1_1.jpg"
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpRecordStore::new(&sync_config(&server)).unwrap();
    let url = store
        .upload_blob(b"jpeg".to_vec(), "seedream_1_1.jpg")
        .await
        .unwrap();

    assert_eq!(url, "https://gallery.test/seedream_1_1.jpg");
}

#[tokio::test]
async fn test_store_error_status_is_sync_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let store = HttpRecordStore::new(&sync_config(&server)).unwrap();
    let err = store
        .create_record("job-2", RecordFields::new().with("prompt", "x"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Sync(ref m) if m.contains("maintenance")));
}

#[test]
fn test_disabled_store_is_not_configured() {
    let config = SyncConfig {
        enabled: false,
        base_url: Some("http://localhost:1".to_string()),
        ..SyncConfig::default()
    };
    assert!(!HttpRecordStore::new(&config).unwrap().is_configured());
    assert!(!HttpRecordStore::new(&SyncConfig::default()).unwrap().is_configured());
}
