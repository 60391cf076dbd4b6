//! HTTP API tests driving the router without a socket.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bmpredict_lib::analysis::{Predictor, SimplePredictor};
use bmpredict_lib::api::{create_router, start_server, ApiConfig};
use bmpredict_lib::core::{OrchestratorConfig, TimeSeries};
use bmpredict_lib::service::PredictionService;
use bmpredict_lib::storage::FileBackend;
use common::MockPredictor;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn service_with(predictor: Arc<dyn Predictor>, timeout: Option<Duration>) -> PredictionService {
    let data = HashMap::from([
        ("get".to_string(), TimeSeries::from_values(1..=10)),
        ("put".to_string(), TimeSeries::from_values([5, 3, 42])),
        ("short".to_string(), TimeSeries::new()),
    ]);
    PredictionService::new(
        Arc::new(FileBackend::from_series(data)),
        predictor,
        OrchestratorConfig {
            max_concurrency: 2,
            prediction_timeout: timeout,
        },
    )
}

fn router_with(predictor: Arc<dyn Predictor>, timeout: Option<Duration>) -> Router {
    let service = service_with(predictor, timeout);
    create_router(Arc::new(service), &ApiConfig::default())
}

fn router() -> Router {
    router_with(Arc::new(SimplePredictor), None)
}

async fn post(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "file");
    assert_eq!(body["predictor"], "simple");
}

#[tokio::test]
async fn test_predict() {
    let (status, body) = post(
        router(),
        "/predict",
        r#"{"Operations": ["get", "put"], "Quantile": 0.5}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "get": 5, "put": 5 }));
}

#[tokio::test]
async fn test_predict_defaults_and_limit() {
    let (status, body) = post(router(), "/predict", r#"{"Operations": ["get"], "MaxLength": 4}"#).await;
    assert_eq!(status, StatusCode::OK);
    // Last four samples are 7..=10; q = 0.95 picks the largest
    assert_eq!(body, json!({ "get": 10 }));
}

#[tokio::test]
async fn test_unknown_operation_is_404() {
    let (status, body) = post(router(), "/predict", r#"{"Operations": ["get", "nope"]}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_bad_requests_are_400() {
    let (status, body) = post(router(), "/predict", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = post(router(), "/predict", r#"{"Operations": []}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(router(), "/predict", r#"{"Operations": ["get"], "Quantile": 0}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(router(), "/cpredict", r#"{"Data": "nope"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_insufficient_data_is_422() {
    let (status, body) = post(router(), "/predict", r#"{"Operations": ["short"]}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("insufficient data"));
}

#[tokio::test]
async fn test_failure_never_returns_partial_results() {
    // Only "put" contains 42; "get" would succeed on its own
    let app = router_with(Arc::new(MockPredictor::new().failing_on(42)), None);
    let (status, body) = post(app, "/predict", r#"{"Operations": ["get", "put"]}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("get").is_none());
    assert!(body.get("put").is_none());
    assert_eq!(body["code"], 500);
}

#[tokio::test]
async fn test_timeout_is_504() {
    let predictor = Arc::new(MockPredictor::new().with_delay(Duration::from_secs(30)));
    let app = router_with(predictor, Some(Duration::from_millis(20)));
    let (status, body) = post(app, "/predict", r#"{"Operations": ["get"]}"#).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], 504);
}

#[tokio::test]
async fn test_custom_predict() {
    let (status, body) = post(
        router(),
        "/cpredict",
        r#"{
            "Data": [
                {"Timestamp": 10, "Value": 4},
                {"Timestamp": 20, "Value": 2},
                {"Timestamp": 30, "Value": 6}
            ],
            "Quantile": 0.5,
            "Name": "sample"
        }"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "Predictions": [
            {"Timestamp": 10, "Value": 4, "Cwrong": 0},
            {"Timestamp": 20, "Value": 2, "Cwrong": 0},
            {"Timestamp": 30, "Value": 4, "Cwrong": 0}
        ] })
    );
}

#[tokio::test]
async fn test_time_series() {
    let (status, body) = post(
        router(),
        "/ts",
        r#"{"Operations": ["put"], "MaxLength": 2}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "put": [
            {"Timestamp": 1, "Value": 3, "Cwrong": 0},
            {"Timestamp": 2, "Value": 42, "Cwrong": 0}
        ] })
    );
}

#[tokio::test]
async fn test_lowercase_request_bodies() {
    // Field names as the Java clients send them
    let (status, body) = post(
        router(),
        "/predict",
        r#"{"quantile": 0.1, "confidence": 0.05, "operations": ["get"], "start": -1, "end": -1}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "get": 1 }));

    let (status, body) = post(
        router(),
        "/cpredict",
        r#"{
            "quantile": 0.1,
            "confidence": 0.05,
            "name": "client",
            "data": [
                {"Timestamp": 1, "Value": 1},
                {"Timestamp": 2, "Value": 9}
            ]
        }"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "Predictions": [
            {"Timestamp": 1, "Value": 1, "Cwrong": 0},
            {"Timestamp": 2, "Value": 1, "Cwrong": 0}
        ] })
    );

    let (status, body) = post(router(), "/ts", r#"{"operations": ["put"], "maxlength": 1}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "put": [{"Timestamp": 2, "Value": 42, "Cwrong": 0}] }));
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let service = Arc::new(service_with(Arc::new(SimplePredictor), None));
    let config = ApiConfig {
        port: 0,
        ..ApiConfig::default()
    };
    let served = tokio::time::timeout(
        Duration::from_secs(5),
        start_server(service, config, async {}),
    )
    .await
    .expect("server did not stop");
    assert!(served.is_ok());
}

#[tokio::test]
async fn test_server_reports_bind_failure() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ApiConfig {
        port: taken.local_addr().unwrap().port(),
        ..ApiConfig::default()
    };
    let service = Arc::new(service_with(Arc::new(SimplePredictor), None));
    let err = start_server(service, config, std::future::pending())
        .await
        .unwrap_err();
    assert_eq!(err.category(), "io");
}
