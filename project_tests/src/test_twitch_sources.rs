//! # Twitch Source Integration Tests
//!
//! Stream status and chatter list sources against a local mock of the
//! kraken API and the chatter list endpoint.

#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lib_common::retrieve::ClientOptions;
use lib_common::twitch::apicall::KRAKEN_ACCEPT;
use lib_common::twitch::{ChannelStreams, ChatterList, ChatterSource, StreamSource, StreamStatus, TwitchApi};
use lib_common::TrackerError;

const CHANNEL_ID: &str = "23366709";

async fn streams_for(server: &MockServer) -> ChannelStreams {
    // No trailing slash on purpose; the client adds it.
    let api = TwitchApi::new(&format!("{}/kraken", server.uri()), "abc123", ClientOptions::default()).unwrap();
    ChannelStreams::new(Arc::new(api), CHANNEL_ID)
}

#[tokio::test]
async fn live_stream_sends_client_id_and_v5_accept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/kraken/streams/{}", CHANNEL_ID)))
        .and(header("client-id", "abc123"))
        .and(header("accept", KRAKEN_ACCEPT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stream": {"viewers": 1234, "game": "Overwatch", "channel": {"name": "shokztv"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = streams_for(&server).await.stream_status().await.unwrap();

    let StreamStatus::Live(metrics) = status else {
        panic!("expected a live stream, got {status:?}");
    };
    assert_eq!(metrics.viewers, 1234);
    assert_eq!(metrics.extra["game"], "Overwatch");
}

#[tokio::test]
async fn null_stream_is_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/kraken/streams/{}", CHANNEL_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stream": null})))
        .mount(&server)
        .await;

    let status = streams_for(&server).await.stream_status().await.unwrap();
    assert_eq!(status, StreamStatus::Offline);
}

#[tokio::test]
async fn upstream_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = streams_for(&server).await.stream_status().await.unwrap_err();
    assert!(matches!(err, TrackerError::Status { status: 500, .. }));
}

#[tokio::test]
async fn chatter_list_is_fetched_from_the_configured_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/group/user/shokztv/chatters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_links": {},
            "chatter_count": 4,
            "chatters": {
                "broadcaster": ["shokztv"],
                "vips": [],
                "moderators": ["nightbot"],
                "staff": [],
                "admins": [],
                "global_mods": [],
                "viewers": ["alice", "bob", "nightbot"]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ChatterList::new(
        &format!("{}/group/user/shokztv/chatters", server.uri()),
        ClientOptions::default(),
    )
    .unwrap();

    let envelope = source.chatters().await.unwrap();
    assert_eq!(envelope.chatters.flatten(), vec!["nightbot", "alice", "bob", "nightbot"]);
}

#[tokio::test]
async fn chatter_list_without_chatters_key_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chatter_count": 0})))
        .mount(&server)
        .await;

    let source = ChatterList::new(&format!("{}/chatters", server.uri()), ClientOptions::default()).unwrap();
    let err = source.chatters().await.unwrap_err();
    assert!(matches!(err, TrackerError::Decode(_)));
}
