use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use vestir::config::{BackgroundConfig, ScoringConfig};
use vestir::preprocess::background::{BackgroundClient, BackgroundError, BackgroundRemover};
use vestir::scoring::{QualityScorer, ScoringClient, ScoringError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scoring_config(server: &MockServer) -> ScoringConfig {
    ScoringConfig {
        enabled: true,
        url: format!("{}/score", server.uri()),
        api_key: "score-key".into(),
        ..ScoringConfig::default()
    }
}

#[tokio::test]
async fn scoring_client_posts_image_and_parses_score() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score"))
        .and(header("authorization", "Bearer score-key"))
        .and(body_json(json!({"image": "https://cdn.test/a.png"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"score": 83.5, "reasoning": "garment drapes naturally"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let scorer = ScoringClient::new(&scoring_config(&server)).unwrap();
    let score = scorer.score("https://cdn.test/a.png").await.unwrap();
    assert_eq!(score.score, 83.5);
    assert_eq!(score.reasoning, "garment drapes naturally");
}

#[tokio::test]
async fn scoring_client_clamps_out_of_range_scores() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 140})))
        .mount(&server)
        .await;

    let scorer = ScoringClient::new(&scoring_config(&server)).unwrap();
    assert_eq!(scorer.score("https://cdn.test/a.png").await.unwrap().score, 100.0);
}

#[tokio::test]
async fn scoring_client_surfaces_service_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model offline"))
        .mount(&server)
        .await;

    let scorer = ScoringClient::new(&scoring_config(&server)).unwrap();
    match scorer.score("https://cdn.test/a.png").await {
        Err(ScoringError::Service { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "model offline");
        }
        other => panic!("expected Service error, got {other:?}"),
    }
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

#[tokio::test]
async fn background_client_round_trips_png_bytes() {
    let server = MockServer::start().await;
    let cutout = png_bytes();
    Mock::given(method("POST"))
        .and(path("/remove"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(cutout.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackgroundClient::new(&BackgroundConfig {
        enabled: true,
        url: format!("{}/remove", server.uri()),
        ..BackgroundConfig::default()
    })
    .unwrap();
    assert_eq!(client.remove(png_bytes()).await.unwrap(), cutout);
}

#[tokio::test]
async fn background_client_reports_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/remove"))
        .respond_with(ResponseTemplate::new(402).set_body_string("out of credits"))
        .mount(&server)
        .await;

    let client = BackgroundClient::new(&BackgroundConfig {
        enabled: true,
        url: format!("{}/remove", server.uri()),
        ..BackgroundConfig::default()
    })
    .unwrap();
    assert!(matches!(
        client.remove(png_bytes()).await,
        Err(BackgroundError::Service { status: 402, .. })
    ));
}
