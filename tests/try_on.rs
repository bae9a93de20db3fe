use std::time::Duration;

use serde_json::json;
use vestir::gate::RequestGate;
use vestir::preprocess::background::BackgroundClient;
use vestir::provider::ProviderClient;
use vestir::scoring::ScoringClient;
use vestir::{Orchestrator, TryOnOptions, VestirConfig};
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AVATAR: &str = "https://cdn.test/avatar.jpg";
const GARMENT: &str = "https://cdn.test/garment.png";

fn config(server: &MockServer) -> VestirConfig {
    let mut config = VestirConfig::default();
    config.provider.base_url = server.uri();
    config.provider.api_key = "sk-test".into();
    config.polling.poll_interval_ms = 20;
    config.gate.jitter_ms = 0;
    config
}

fn orchestrator(
    config: VestirConfig,
    scorer: Option<ScoringClient>,
) -> Orchestrator<ProviderClient, Option<ScoringClient>, Option<BackgroundClient>> {
    let provider = ProviderClient::new(&config.provider).unwrap();
    let gate = RequestGate::new(config.gate.clone());
    Orchestrator::new(config, gate, provider, scorer, None)
}

#[tokio::test]
async fn polls_job_and_picks_best_scored_sample() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(body_partial_json(json!({
            "inputs": {
                "category": "one-pieces",
                "mode": "quality",
                "num_samples": 2,
                "segmentation_free": false,
                "garment_image": GARMENT
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-7", "status": "in_queue"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/job-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-7",
            "status": "completed",
            "output": ["https://cdn.test/a.png", "https://cdn.test/b.png"]
        })))
        .mount(&server)
        .await;
    for (url, score) in [("https://cdn.test/a.png", 30.0), ("https://cdn.test/b.png", 90.0)] {
        Mock::given(method("POST"))
            .and(path("/score"))
            .and(body_json(json!({"image": url})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": score, "reasoning": "ok"})))
            .mount(&server)
            .await;
    }

    let mut config = config(&server);
    config.scoring.enabled = true;
    config.scoring.url = format!("{}/score", server.uri());
    let scorer = ScoringClient::new(&config.scoring).unwrap();
    let orch = orchestrator(config, Some(scorer));

    let options = TryOnOptions {
        garment_description: Some("red floral print maxi dress".into()),
        ..Default::default()
    };
    let result = orch.try_on(AVATAR, GARMENT, &options).await.unwrap();

    assert!(result.success);
    assert!(!result.fallback_used, "unexpected fallback: {:?}", result.diagnostics.error);
    assert_eq!(result.image_url, "https://cdn.test/b.png");
    assert_eq!(result.diagnostics.selected_score, Some(90.0));
    assert_eq!(result.diagnostics.job_id.as_deref(), Some("job-7"));
}

#[tokio::test]
async fn open_circuit_falls_back_without_calling_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.gate.min_request_interval_ms = 1;
    config.gate.circuit_breaker_base_ms = 60_000;
    let orch = orchestrator(config, None);

    for _ in 0..3 {
        let result = orch.try_on(AVATAR, GARMENT, &TryOnOptions::default()).await.unwrap();
        assert!(result.fallback_used);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let result = orch.try_on(AVATAR, GARMENT, &TryOnOptions::default()).await.unwrap();
    assert!(result.success);
    assert!(result.fallback_used);
    assert_eq!(result.image_url, AVATAR);
    assert!(result.diagnostics.retry_after_ms.unwrap() > 0);
    // `.expect(3)` is verified when the server drops.
}

#[tokio::test]
async fn provider_failure_keeps_original_avatar() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-9", "status": "starting"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": {"name": "ImageLoadError", "message": "could not fetch garment"}
        })))
        .mount(&server)
        .await;

    let orch = orchestrator(config(&server), None);
    let result = orch.try_on(AVATAR, GARMENT, &TryOnOptions::default()).await.unwrap();

    assert!(result.fallback_used);
    assert_eq!(result.image_url, AVATAR);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["diagnostics"]["failure_category"], "invalid_image");
    assert_eq!(orch.gate().snapshot().await.consecutive_failures, 0);
}
