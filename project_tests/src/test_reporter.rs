//! # Reporter Integration Tests
//!
//! The analytics half of the reporter against a mock webservice. The link is
//! a real `LinkHandle` whose connection task is never started, so it stays in
//! `Connecting` and every frame is dropped.

#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lib_common::connections::{BackendLink, ReconnectPolicy};
use lib_common::core::{Delivery, Reporter, WebserviceSink};
use lib_common::presence::DiffResult;
use lib_common::retrieve::ClientOptions;
use lib_common::twitch::StreamMetrics;

fn reporter_for(url: &str) -> Reporter {
    // Retries requested here must be ignored by the sink.
    let options = ClientOptions {
        max_retries: 3,
        ..Default::default()
    };
    let sink = WebserviceSink::new(url, options).unwrap();
    let (_link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::default());
    Reporter::new(Arc::new(handle), Arc::new(sink))
}

fn sink_url(server: &MockServer) -> String {
    format!("{}/chatters", server.uri())
}

fn diff() -> DiffResult {
    DiffResult {
        joined: vec!["c".into()],
        stayed: vec!["b".into()],
        parted: vec!["a".into()],
    }
}

#[tokio::test]
async fn created_is_saved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chatters"))
        .and(body_json(json!({
            "chatter": {"joined": ["c"], "stayed": ["b"], "parted": ["a"]},
            "stream": {"viewers": 10, "game": "Overwatch"}
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let metrics: StreamMetrics = serde_json::from_value(json!({"viewers": 10, "game": "Overwatch"})).unwrap();
    let delivery = reporter_for(&sink_url(&server)).report(diff(), metrics).await.unwrap();

    assert_eq!(delivery, Delivery::Saved);
}

#[tokio::test]
async fn server_error_is_rejected_once_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let delivery = reporter_for(&sink_url(&server))
        .report(diff(), StreamMetrics::with_viewers(1))
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::Rejected(500));
}

#[tokio::test]
async fn plain_ok_is_not_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let delivery = reporter_for(&sink_url(&server))
        .report(diff(), StreamMetrics::with_viewers(1))
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::Rejected(200));
}

#[tokio::test]
async fn unreachable_sink_fails_quietly() {
    // Port 9 (discard) is assumed closed on the test host.
    let delivery = reporter_for("http://127.0.0.1:9/chatters")
        .report(diff(), StreamMetrics::with_viewers(1))
        .await
        .unwrap();

    assert!(matches!(delivery, Delivery::Failed(_)));
}
