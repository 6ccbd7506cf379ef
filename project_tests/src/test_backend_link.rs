//! # Backend Link Integration Tests
//!
//! Runs `BackendLink` against a throwaway `tokio-tungstenite` server on
//! localhost: frame delivery while open, reconnection after the server drops
//! the connection, and the reporter's viewers frame end to end.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use lib_common::connections::{BackendLink, LinkHandle, LinkState, PushLink, ReconnectPolicy, SendOutcome};
use lib_common::core::Reporter;
use lib_common::presence::DiffResult;
use lib_common::twitch::StreamMetrics;
use project_tests::RecordingSink;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum ServerEvent {
    Accepted(usize),
    Text(usize, String),
}

/// Accepts connections forever. The first `close_first` connections are
/// closed by the server right after the handshake; later ones are read
/// until the client goes away.
async fn spawn_server(close_first: usize) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(mut ws) = accept_async(stream).await else {
                continue;
            };
            let _ = tx.send(ServerEvent::Accepted(index));

            if index < close_first {
                let _ = ws.close(None).await;
            } else {
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            let _ = tx.send(ServerEvent::Text(index, text.as_str().to_owned()));
                        }
                    }
                });
            }
            index += 1;
        }
    });

    (url, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for the server")
        .expect("server task ended")
}

async fn wait_open(handle: &LinkHandle) {
    let opened = tokio::time::timeout(WAIT, handle.wait_for_state(LinkState::Open)).await;
    assert_eq!(opened, Ok(true), "link never opened");
}

#[tokio::test]
async fn open_link_delivers_frames() {
    let (url, mut events) = spawn_server(0).await;
    let (link, handle) = BackendLink::new(url, ReconnectPolicy::fixed(Duration::from_millis(100)));
    let task = tokio::spawn(link.run());

    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted(0)));
    wait_open(&handle).await;

    assert_eq!(handle.send(r#"{"hello":1}"#.to_string()), SendOutcome::Queued);
    match next_event(&mut events).await {
        ServerEvent::Text(0, text) => assert_eq!(text, r#"{"hello":1}"#),
        other => panic!("unexpected event: {other:?}"),
    }

    task.abort();
}

#[tokio::test]
async fn reconnects_after_server_close() {
    let (url, mut events) = spawn_server(1).await;
    let (link, handle) = BackendLink::new(url, ReconnectPolicy::fixed(Duration::from_millis(200)));
    let task = tokio::spawn(link.run());

    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted(0)));
    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted(1)));
    wait_open(&handle).await;

    assert_eq!(handle.send("after-reconnect".to_string()), SendOutcome::Queued);
    match next_event(&mut events).await {
        ServerEvent::Text(1, text) => assert_eq!(text, "after-reconnect"),
        other => panic!("unexpected event: {other:?}"),
    }

    task.abort();
}

#[tokio::test]
async fn reporter_pushes_viewers_frame_when_open() {
    let (url, mut events) = spawn_server(0).await;
    let (link, handle) = BackendLink::new(url, ReconnectPolicy::fixed(Duration::from_millis(100)));
    let task = tokio::spawn(link.run());

    assert!(matches!(next_event(&mut events).await, ServerEvent::Accepted(0)));
    wait_open(&handle).await;

    let sink = Arc::new(RecordingSink::new(201));
    let reporter = Reporter::new(Arc::new(handle.clone()), sink.clone());
    let diff = DiffResult {
        joined: vec!["c".into()],
        stayed: vec!["b".into()],
        parted: vec!["a".into()],
    };
    reporter.report(diff, StreamMetrics::with_viewers(2)).await.unwrap();

    let ServerEvent::Text(_, text) = next_event(&mut events).await else {
        panic!("expected a text frame");
    };
    let frame: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        frame,
        json!({
            "viewer": {
                "chatter": {"joined": ["c"], "stayed": ["b"], "parted": ["a"]},
                "totalCount": 2
            },
            "type": "viewers"
        })
    );
    assert_eq!(sink.payloads().len(), 1);

    task.abort();
}

#[tokio::test]
async fn frames_are_dropped_while_reconnecting() {
    // Nothing listens on port 9; every attempt fails.
    let (link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::fixed(Duration::from_secs(60)));
    let task = tokio::spawn(link.run());

    let closed = tokio::time::timeout(WAIT, handle.wait_for_state(LinkState::Closed)).await;
    assert_eq!(closed, Ok(true));
    assert_eq!(handle.state(), LinkState::Closed);
    assert_eq!(handle.send("lost".to_string()), SendOutcome::Dropped(LinkState::Closed));

    task.abort();
}
