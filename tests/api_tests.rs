//! HTTP-level tests for the router, run through `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use weather_service::alerts::TracingAlertSink;
use weather_service::config::Config;
use weather_service::handlers::AppState;
use weather_service::rate_limit::{LocalCounter, RateLimiter};
use weather_service::server::create_router;
use weather_service::store::{self, ObservationStore};

async fn build_app(config: Config, limiter: Option<RateLimiter>) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config;
    config.storage.sqlite_path = dir.path().join("weather.db");

    let store = store::connect(&config.storage).await.unwrap();
    store.initialize().await.unwrap();
    let state = AppState::new(store, Arc::new(TracingAlertSink));

    (create_router(&config, state, limiter, None), dir)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn seed(app: &Router) {
    let (status, body) = send(
        app,
        post_json(
            "/api/observations",
            json!([
                {"district": "A", "date": "2024-01-01T10:00", "temp": 10, "humidity": 40, "wind_speed": 3},
                {"district": "B", "date": "2024-01-02T10:00", "temp": 20, "humidity": 60, "wind_speed": 7},
                {"district": "Antalya", "date": "2024-01-02T10:30", "temp": 25, "humidity": 55, "wind_speed": 4},
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": 3, "stored": 3, "dropped": 0}));
}

#[tokio::test]
async fn test_health() {
    let (app, _dir) = build_app(Config::default(), None).await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ingest_then_statistics() {
    let (app, _dir) = build_app(Config::default(), None).await;
    seed(&app).await;

    let (status, body) = send(&app, get("/api/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_humidity"], 60.0);
    assert_eq!(body["min_temp"], 10.0);
}

#[tokio::test]
async fn test_statistics_on_empty_store_are_null() {
    let (app, _dir) = build_app(Config::default(), None).await;
    let (status, body) = send(&app, get("/api/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["avg_temp"].is_null());
    assert!(body["max_wind_speed"].is_null());
}

#[tokio::test]
async fn test_ingest_drops_implausible_records() {
    let (app, _dir) = build_app(Config::default(), None).await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/observations",
            json!([
                {"district": "A", "date": "2024-01-01T10:00", "temp": 10, "humidity": 40, "wind_speed": 3},
                {"district": "A", "date": "not a date", "temp": 10, "humidity": 40, "wind_speed": 3},
                {"district": "B", "date": "2024-01-01T10:00", "temp": 10, "humidity": 140, "wind_speed": 3},
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": 3, "stored": 1, "dropped": 2}));
}

#[tokio::test]
async fn test_latest_data_shape_and_order() {
    let (app, _dir) = build_app(Config::default(), None).await;
    seed(&app).await;

    let (status, body) = send(&app, get("/api/latest-data?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["district"], "Antalya");
    assert_eq!(rows[0]["date"], "2024-01-02T10:30:00");
    assert_eq!(rows[0]["temp"], 25.0);
    assert_eq!(rows[1]["district"], "B");
}

#[tokio::test]
async fn test_by_district_is_case_insensitive() {
    let (app, _dir) = build_app(Config::default(), None).await;
    seed(&app).await;

    let (status, body) = send(&app, get("/api/by-district?name=antalya")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, get("/api/by-district")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_data_range_treats_empty_params_as_absent() {
    let (app, _dir) = build_app(Config::default(), None).await;
    seed(&app).await;

    let (status, body) = send(&app, get("/api/data-range?start=&end=&districts=")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["district"], "A");

    let (status, body) = send(
        &app,
        get("/api/data-range?start=2024-01-02T00:00&districts=b,antalya"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_bad_query_values_are_400() {
    let (app, _dir) = build_app(Config::default(), None).await;

    let (status, body) = send(&app, get("/api/latest-data?limit=many")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    let (status, _) = send(&app, get("/api/data-range?start=soon")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hourly_average_endpoint() {
    let (app, _dir) = build_app(Config::default(), None).await;
    send(
        &app,
        post_json(
            "/api/observations",
            json!([
                {"district": "A", "date": "2024-01-01T10:10", "temp": 10, "humidity": 40, "wind_speed": 2},
                {"district": "A", "date": "2024-01-01T10:40", "temp": 20, "humidity": 60, "wind_speed": 4},
            ]),
        ),
    )
    .await;

    let (status, body) = send(&app, get("/api/hourly-average?district=a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"hour": "2024-01-01T10", "avg_temp": 15.0, "avg_humidity": 50.0, "avg_wind_speed": 3.0}])
    );
}

#[tokio::test]
async fn test_rate_limit_answers_429_with_fixed_body() {
    let limiter = RateLimiter::new(Arc::new(LocalCounter::new(100)), 3, Duration::from_secs(60));
    let (app, _dir) = build_app(Config::default(), Some(limiter)).await;

    let from = |ip: &str| {
        let mut request = get("/health");
        let addr: SocketAddr = format!("{ip}:5000").parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    };

    for _ in 0..3 {
        let (status, _) = send(&app, from("10.0.0.1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, from("10.0.0.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({"error": {"message": "Too many requests", "type": "rate_limited"}})
    );

    let (status, _) = send(&app, from("10.0.0.2")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let mut config = Config::default();
    config.auth.api_keys = vec!["key-1".to_string()];
    let (app, _dir) = build_app(config, None).await;

    let (status, body) = send(&app, get("/api/latest-data")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "unauthorized");

    let request = Request::builder()
        .uri("/api/latest-data")
        .header("X-API-Key", "key-1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}
