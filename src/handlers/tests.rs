//! # Tests for Handlers
//!
//! Router-level tests driving the handlers through `tower::ServiceExt::oneshot`
//! over an in-memory SQLite database.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::providers::config::{ApiFamily, AuthStrategy, Credentials, ProviderConfig};
use crate::server::{AppState, build_state, create_app};

const TOKEN: &str = "operator-token";

async fn test_state() -> AppState {
    let config = AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        operator_tokens: vec![TOKEN.to_string()],
        crypto_key: Some(vec![7u8; 32]),
        ..Default::default()
    };
    let conn = db::init_pool(&config).await.unwrap();
    db::migrate(&conn).await.unwrap();
    build_state(Arc::new(config), conn).await.unwrap()
}

fn register_provider(state: &AppState, code: &str) -> Uuid {
    let mut config = ProviderConfig::new(
        code,
        ApiFamily::GenericRest,
        Url::parse("http://127.0.0.1:9").unwrap(),
        AuthStrategy::ApiKey,
    );
    config.credentials = Credentials::ApiKey {
        key: "k".to_string(),
        secret: None,
    };
    state.aggregator.registry().register(config).unwrap().id()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn search_body(origin: &str, destination: &str) -> Value {
    json!({
        "criteria": {
            "origin": origin,
            "destination": destination,
            "departureDate": "2030-06-01",
            "passengers": 1
        }
    })
}

#[tokio::test]
async fn test_root_returns_service_info() {
    let app = create_app(test_state().await);
    let (status, body) = send(
        app,
        Request::builder().uri("/").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "flight-aggregator");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_pings_database() {
    let app = create_app(test_state().await);
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));
}

#[tokio::test]
async fn test_search_without_providers_returns_empty_results() {
    let app = create_app(test_state().await);
    let (status, body) = send(
        app,
        json_request("POST", "/flights/search", search_body("JFK", "LAX"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
    assert_eq!(body["providerErrors"], json!({}));
}

#[tokio::test]
async fn test_search_rejects_invalid_criteria() {
    let app = create_app(test_state().await);
    let (status, body) = send(
        app,
        json_request("POST", "/flights/search", search_body("JFK", "JFK"), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_search_rejects_out_of_range_deadline() {
    let app = create_app(test_state().await);
    let mut body = search_body("JFK", "LAX");
    body["deadlineMs"] = json!(0);
    let (status, _) = send(app, json_request("POST", "/flights/search", body, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_with_every_provider_failing_returns_502() {
    let state = test_state().await;
    let id = register_provider(&state, "unreachable");
    let app = create_app(state);

    let mut body = search_body("JFK", "LAX");
    body["deadlineMs"] = json!(2000);
    let (status, body) = send(app, json_request("POST", "/flights/search", body, None)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_ERROR");
    assert!(body["details"]["providerErrors"][id.to_string()].is_object());
}

#[tokio::test]
async fn test_provider_routes_require_operator_token() {
    let app = create_app(test_state().await);
    let (status, body) = send(
        app.clone(),
        Request::builder().uri("/providers").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(
        app,
        json_request("POST", "/providers/sync", json!({}), Some("wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_providers_reports_capacity() {
    let state = test_state().await;
    let id = register_provider(&state, "alpha");
    let app = create_app(state);

    let request = Request::builder()
        .uri("/providers")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["id"], id.to_string());
    assert_eq!(providers[0]["status"], "active");
    assert_eq!(
        providers[0]["remainingCapacity"],
        providers[0]["rateLimitPerMinute"]
    );
}

#[tokio::test]
async fn test_unknown_provider_returns_404() {
    let app = create_app(test_state().await);
    let uri = format!("/providers/{}/health-check", Uuid::new_v4());
    let (status, body) = send(app, json_request("POST", &uri, json!({}), Some(TOKEN))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_bookings_are_not_implemented() {
    let state = test_state().await;
    let id = register_provider(&state, "alpha");
    let app = create_app(state);

    let (status, body) = send(
        app.clone(),
        json_request(
            "POST",
            &format!("/providers/{id}/bookings"),
            json!({ "flightNumber": "AA100", "passengers": 1 }),
            Some(TOKEN),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["code"], "NOT_IMPLEMENTED");

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/providers/{id}/bookings/PNR123"))
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_app(test_state().await);
    let (status, body) = send(
        app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/flights/search"].is_object());
}
