//! Fear & Greed client against a mock HTTP server

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::database::open_destination_database;
use crate::common::test_data::date;
use stock_etl::api::{FearGreedClient, FearGreedPoint};
use stock_etl::loader::{BulkLoader, LoadOptions};
use stock_etl::models::{Config, Value};
use stock_etl::staging::fear_greed::{raw_records, FearGreedNormalizer};
use stock_etl::staging::StagingNormalizer;

const JAN_1_2024_MS: f64 = 1_704_067_200_000.0;
const DAY_MS: f64 = 86_400_000.0;

fn config_for(server: &MockServer) -> Config {
    Config {
        fear_greed_url: format!("{}/index/fearandgreed/graphdata/", server.uri()),
        http_timeout_secs: 5,
        ..Config::default()
    }
}

fn payload() -> serde_json::Value {
    // newest first, as the endpoint sometimes returns it
    json!({
        "fear_and_greed": {"score": 48.0, "rating": "neutral"},
        "fear_and_greed_historical": {
            "timestamp": JAN_1_2024_MS + 2.0 * DAY_MS,
            "data": [
                {"x": JAN_1_2024_MS + 2.0 * DAY_MS, "y": 48.0, "rating": "neutral"},
                {"x": JAN_1_2024_MS + DAY_MS, "y": 44.25, "rating": "fear"},
                {"x": JAN_1_2024_MS, "y": 41.5, "rating": "fear"}
            ]
        }
    })
}

async fn mount_payload(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/index/fearandgreed/graphdata/"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_history() {
    let server = MockServer::start().await;
    mount_payload(&server, payload()).await;

    let client = FearGreedClient::new(&config_for(&server)).unwrap();
    let points = client.fetch_history().await.unwrap();

    assert_eq!(points.len(), 3);
    assert_eq!(
        points[2],
        FearGreedPoint {
            x: JAN_1_2024_MS,
            y: 41.5
        }
    );
}

#[tokio::test]
async fn test_rejected_request_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(418))
        .mount(&server)
        .await;

    let client = FearGreedClient::new(&config_for(&server)).unwrap();
    let err = client.fetch_history().await.unwrap_err();
    assert!(err.to_string().contains("418"), "{}", err);
}

#[tokio::test]
async fn test_payload_without_history_is_an_error() {
    let server = MockServer::start().await;
    mount_payload(&server, json!({"fear_and_greed": {"score": 50.0}})).await;

    let client = FearGreedClient::new(&config_for(&server)).unwrap();
    assert!(client.fetch_history().await.is_err());
}

#[tokio::test]
async fn test_fetch_stage_and_load() {
    let server = MockServer::start().await;
    mount_payload(&server, payload()).await;
    let test_db = open_destination_database().await;

    let points = FearGreedClient::new(&config_for(&server))
        .unwrap()
        .fetch_history()
        .await
        .unwrap();
    let (staged, report) = FearGreedNormalizer.normalize(&raw_records(&points));
    assert_eq!(report.staged(), 3);
    assert_eq!(staged.records[0].get("date"), &Value::Date(date(2024, 1, 1)));
    assert_eq!(staged.records[0].get("fear_and_greed"), &Value::Float(41.5));

    let loader = BulkLoader::new(&test_db.db, LoadOptions::default());
    let first = loader.load(&staged).await.unwrap();
    let second = loader.load(&staged).await.unwrap();

    assert_eq!((first.inserted, first.skipped), (3, 0));
    assert_eq!((second.inserted, second.skipped), (0, 3));
    assert_eq!(test_db.count("fear_and_greed_index").await, 3);
}
