use std::time::Duration;

use serde_json::json;
use vestir::provider::{
    ErrorClass, ProviderClient, ProviderError, RunInputs, RunRequest, TryOnProvider,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ProviderClient {
    ProviderClient::with_base_url("sk-test".into(), server.uri(), Duration::from_secs(5)).unwrap()
}

fn run_request() -> RunRequest {
    RunRequest {
        model: "tryon-v1.6".into(),
        inputs: RunInputs {
            model_image: "https://cdn.test/avatar.jpg".into(),
            garment_image: "https://cdn.test/shirt.png".into(),
            category: "tops".into(),
            segmentation_free: false,
            mode: "performance".into(),
            seed: 42,
            num_samples: 1,
            output_format: "png".into(),
        },
    }
}

#[tokio::test]
async fn run_posts_body_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "tryon-v1.6",
            "inputs": {"category": "tops", "num_samples": 1}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "job-1", "status": "starting"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).run(&run_request()).await.unwrap();
    assert_eq!(response.id.as_deref(), Some("job-1"));
    assert_eq!(response.status.as_deref(), Some("starting"));
}

#[tokio::test]
async fn status_returns_outputs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-1",
            "status": "completed",
            "output": ["https://cdn.test/out.png"],
            "error": null
        })))
        .mount(&server)
        .await;

    let status = client(&server).status("job-1").await.unwrap();
    assert_eq!(status.status, "completed");
    assert_eq!(status.output.unwrap(), vec!["https://cdn.test/out.png"]);
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = client(&server).run(&run_request()).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::RateLimited {
            retry_after_ms: 7000
        }
    ));
    assert_eq!(err.class(), ErrorClass::RateLimited);
}

#[tokio::test]
async fn client_errors_are_validation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unsupported category"))
        .mount(&server)
        .await;

    match client(&server).run(&run_request()).await {
        Err(ProviderError::Validation { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "unsupported category");
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-2"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = client(&server).status("job-2").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        client(&server).status("job-3").await,
        Err(ProviderError::ParseError(_))
    ));
}
