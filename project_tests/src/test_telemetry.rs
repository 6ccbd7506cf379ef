//! # Telemetry Integration Tests
//!
//! The forwarder posts error-level records to a mock collector. The fern
//! dispatch is exercised through `into_log` so no global logger is installed.

#![forbid(unsafe_code)]

use std::time::Duration;

use log::{Level, Log, Record};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lib_common::loggers::Telemetry;
use lib_common::retrieve::ClientOptions;
use project_tests::eventually;

async fn collector() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    server
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|req| serde_json::from_slice(&req.body).unwrap())
        .collect()
}

#[tokio::test]
async fn recorded_event_is_posted() {
    let server = collector().await;
    let (telemetry, _forwarder) = Telemetry::spawn(
        &format!("{}/events", server.uri()),
        "server_chatters",
        ClientOptions::default(),
    )
    .unwrap();

    assert!(telemetry.record(
        &Record::builder()
            .level(Level::Error)
            .target("lib_common::core::reporter")
            .args(format_args!("Error while saving chatters and analytics: status {}", 500))
            .build()
    ));

    let server_ref = &server;
    let arrived = eventually(Duration::from_secs(5), move || async move {
        received_bodies(server_ref).await.len() == 1
    });
    assert!(arrived.await);

    let bodies = received_bodies(&server).await;
    let body = &bodies[0];
    assert_eq!(body["app"], "server_chatters");
    assert_eq!(body["level"], "ERROR");
    assert_eq!(body["target"], "lib_common::core::reporter");
    assert_eq!(body["message"], "Error while saving chatters and analytics: status 500");
    assert_eq!(body["pid"], std::process::id());
    assert!(body["ts"].is_string());
}

#[tokio::test]
async fn dispatch_forwards_errors_only() {
    let server = collector().await;
    let (telemetry, _forwarder) = Telemetry::spawn(
        &format!("{}/events", server.uri()),
        "server_chatters",
        ClientOptions::default(),
    )
    .unwrap();
    let (_level, logger) = telemetry.dispatch().into_log();

    for (level, target, text) in [
        (Level::Warn, "server_chatters", "just a warning"),
        (Level::Error, "reqwest::connect", "transport noise"),
        (Level::Error, "server_chatters", "a real failure"),
    ] {
        logger.log(
            &Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{}", text))
                .build(),
        );
    }

    let server_ref = &server;
    let arrived = eventually(Duration::from_secs(5), move || async move {
        !received_bodies(server_ref).await.is_empty()
    });
    assert!(arrived.await);
    // Give stray events a chance to show up before counting.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["message"], "a real failure");
}
