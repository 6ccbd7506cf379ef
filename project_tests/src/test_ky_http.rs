//! # `ky_http` Client Integration Tests
//!
//! Exercises `lib_common::retrieve::ky_http::ApiClient` against a local
//! `wiremock` server: URL joining, default headers, status handling, JSON
//! bodies and the transient-retry middleware.

#![forbid(unsafe_code)]

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lib_common::retrieve::ky_http::{ApiClient, ClientOptions};
use lib_common::TrackerError;

fn base(server: &MockServer) -> String {
    format!("{}/api/", server.uri())
}

#[tokio::test]
async fn joins_paths_and_sends_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams/42"))
        .and(header("x-test", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut default_headers = HeaderMap::new();
    default_headers.insert(HeaderName::from_static("x-test"), HeaderValue::from_static("yes"));
    let client = ApiClient::new(
        &base(&server),
        ClientOptions {
            default_headers,
            ..Default::default()
        },
    )
    .unwrap();

    let body: Value = client.get_json("streams/42").await.unwrap();
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn non_success_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
        .mount(&server)
        .await;

    let client = ApiClient::new(&base(&server), ClientOptions::default()).unwrap();

    let response = client
        .request::<Value, ()>(Method::GET, "missing", None)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.status, 404);
    assert_eq!(response.error_body.as_deref(), Some("no such thing"));

    let err = client.get_json::<Value>("missing").await.unwrap_err();
    assert!(matches!(err, TrackerError::Status { status: 404, ref body } if body == "no such thing"));
}

#[tokio::test]
async fn empty_success_body_is_a_schema_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = ApiClient::new(&base(&server), ClientOptions::default()).unwrap();
    let err = client.get_json::<Value>("empty").await.unwrap_err();
    assert!(matches!(err, TrackerError::Schema(_)));
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = ApiClient::new(&base(&server), ClientOptions::default()).unwrap();
    let err = client.get_json::<Value>("broken").await.unwrap_err();
    assert!(matches!(err, TrackerError::Decode(_)));
}

#[tokio::test]
async fn post_returns_status_and_sends_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/records"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"id": 1})))
        .respond_with(ResponseTemplate::new(201).set_body_string("not json at all"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&base(&server), ClientOptions::default()).unwrap();
    let status = client.post_json("records", &json!({"id": 1})).await.unwrap();
    assert_eq!(status, 201);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"attempt": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(
        &base(&server),
        ClientOptions {
            max_retries: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let body: Value = client.get_json("flaky").await.unwrap();
    assert_eq!(body, json!({"attempt": 2}));
}

#[tokio::test]
async fn without_retries_a_failure_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&base(&server), ClientOptions::default()).unwrap();
    let err = client.get_json::<Value>("down").await.unwrap_err();
    assert!(matches!(err, TrackerError::Status { status: 503, .. }));
}
