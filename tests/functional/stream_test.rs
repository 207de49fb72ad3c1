//! Functional tests for the streaming generation client

use crate::support::{api_config, backend, sse_response, success_stream, API_KEY, GENERATIONS_PATH};
use gen_image_pipeline::backend::http_backend::HttpBackend;
use gen_image_pipeline::backend::traits::{
    ImagePayload, ImageSize, SequentialMode, SequentialOptions,
};
use gen_image_pipeline::error::ApiErrorKind;
use gen_image_pipeline::{classify, AppError, GenerationUnit, ImageBackend};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unit(index: usize) -> GenerationUnit {
    GenerationUnit {
        index,
        payload: ImagePayload {
            model: "doubao-seedream-4-0-250828".to_string(),
            prompt: "a red bicycle".to_string(),
            size: ImageSize::Resolution2K.as_api_value(),
            response_format: "url".to_string(),
            watermark: false,
            stream: true,
            image: None,
            strength: None,
            sequential_image_generation: SequentialMode::Auto,
            sequential_image_generation_options: Some(SequentialOptions { max_images: 1 }),
        },
    }
}

#[tokio::test]
async fn test_stream_yields_first_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .and(header("authorization", "Bearer test-key"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({
            "model": "doubao-seedream-4-0-250828",
            "prompt": "a red bicycle",
            "size": "2K",
            "response_format": "url",
            "stream": true,
            "sequential_image_generation": "auto",
            "sequential_image_generation_options": { "max_images": 1 }
        })))
        .respond_with(sse_response(success_stream("https://cdn.test/a.jpg")))
        .expect(1)
        .mount(&server)
        .await;

    let image = backend(&server).generate_one(&unit(3)).await.unwrap();

    assert_eq!(image.index, 3);
    assert_eq!(image.url, "https://cdn.test/a.jpg");
    assert_eq!(image.size, "2048x2048");
    assert!(image.local_path.is_none());
}

#[tokio::test]
async fn test_stream_skips_unknown_frames() {
    let server = MockServer::start().await;
    let body = "data: {\"type\":\"heartbeat\"}\n\n\
                data: not json\n\n\
                data: {\"type\":\"image_generation.partial_succeeded\",\"url\":\"https://cdn.test/b.jpg\",\"size\":\"1024x1024\"}\n\n";
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(sse_response(body.to_string()))
        .mount(&server)
        .await;

    let image = backend(&server).generate_one(&unit(1)).await.unwrap();
    assert_eq!(image.url, "https://cdn.test/b.jpg");
    assert_eq!(image.approximate_tokens(), Some(4096));
}

#[tokio::test]
async fn test_failure_frame_is_content_filter_error() {
    let server = MockServer::start().await;
    let body = "data: {\"type\":\"image_generation.partial_failed\",\"error\":{\"code\":\"OutputImageSensitiveContentDetected\",\"message\":\"sensitive content\"}}\n\n";
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(sse_response(body.to_string()))
        .mount(&server)
        .await;

    let err = backend(&server).generate_one(&unit(1)).await.unwrap_err();
    assert!(matches!(err, AppError::GenerationFailed(ref m) if m == "sensitive content"));
    assert!(classify(&err).contains("content filter"));
}

#[tokio::test]
async fn test_error_status_carries_body_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({ "error": { "message": "invalid api key" } })),
        )
        .mount(&server)
        .await;

    let err = backend(&server).generate_one(&unit(1)).await.unwrap_err();
    match &err {
        AppError::Api(api) => {
            assert_eq!(api.kind, ApiErrorKind::Unauthorized);
            assert_eq!(api.status, Some(401));
            assert_eq!(api.message, "invalid api key");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(classify(&err).starts_with("Authentication failed: invalid api key"));
}

#[tokio::test]
async fn test_missing_key_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&api_config(&server, None)).unwrap();
    assert!(!backend.has_credentials());

    let err = backend.generate_one(&unit(1)).await.unwrap_err();
    assert!(matches!(err, AppError::MissingCredentials));
}

#[tokio::test]
async fn test_slow_stream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(
            sse_response(success_stream("https://cdn.test/late.jpg"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = gen_image_pipeline::config::ApiConfig {
        timeout_secs: 1,
        ..api_config(&server, Some(API_KEY))
    };
    let err = HttpBackend::new(&config)
        .unwrap()
        .generate_one(&unit(1))
        .await
        .unwrap_err();

    assert!(classify(&err).starts_with("Request timed out"));
}

#[tokio::test]
async fn test_stream_without_image_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(sse_response("data: [DONE]\n\n".to_string()))
        .mount(&server)
        .await;

    let err = backend(&server).generate_one(&unit(1)).await.unwrap_err();
    assert!(matches!(err, AppError::GenerationFailed(_)));
}
