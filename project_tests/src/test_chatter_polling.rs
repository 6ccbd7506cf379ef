//! # Chatter Polling Integration Tests
//!
//! Drives `ChatterPollingPlugin::run` on a paused Tokio clock with scripted
//! sources, checking the cadence, the offline path, panic isolation, a failing
//! analytics sink and the single-flight rule.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use lib_common::connections::{BackendLink, LinkState, PushLink, ReconnectPolicy, SendOutcome};
use lib_common::core::Reporter;
use lib_common::error::Result;
use lib_common::ingestors::{ChatterPollingPlugin, DEFAULT_POLL_INTERVAL};
use lib_common::twitch::{ChatterCategories, ChatterSource, ChattersEnvelope, StreamMetrics, StreamSource, StreamStatus};
use project_tests::RecordingSink;

/// Stream source whose behaviour depends on the call number.
struct ScriptedStreams<F> {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    script: F,
    hold: Duration,
}

impl<F> ScriptedStreams<F>
where
    F: Fn(usize) -> StreamStatus + Send + Sync,
{
    fn new(script: F) -> Arc<Self> {
        Self::holding(Duration::ZERO, script)
    }

    /// Every call takes `hold` of (virtual) time before answering.
    fn holding(hold: Duration, script: F) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            script,
            hold,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> StreamSource for ScriptedStreams<F>
where
    F: Fn(usize) -> StreamStatus + Send + Sync,
{
    async fn stream_status(&self) -> Result<StreamStatus> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok((self.script)(call))
    }
}

#[derive(Default)]
struct CountingChatters {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatterSource for CountingChatters {
    async fn chatters(&self) -> Result<ChattersEnvelope> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChattersEnvelope {
            chatters: ChatterCategories {
                viewers: vec!["alice".to_string(), "bob".to_string()],
                ..Default::default()
            },
        })
    }
}

/// A link that stays open and keeps every frame.
#[derive(Default)]
struct OpenLink {
    frames: Mutex<Vec<String>>,
}

impl OpenLink {
    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

impl PushLink for OpenLink {
    fn state(&self) -> LinkState {
        LinkState::Open
    }

    fn send(&self, frame: String) -> SendOutcome {
        self.frames.lock().unwrap().push(frame);
        SendOutcome::Queued
    }
}

fn start(
    streams: Arc<dyn StreamSource>,
    chatters: Arc<CountingChatters>,
    sink: Arc<RecordingSink>,
) -> tokio::task::JoinHandle<()> {
    // The link task is never started, so every frame is dropped.
    let (_link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::default());
    start_with_link(streams, chatters, sink, Arc::new(handle))
}

fn start_with_link(
    streams: Arc<dyn StreamSource>,
    chatters: Arc<CountingChatters>,
    sink: Arc<RecordingSink>,
    link: Arc<dyn PushLink>,
) -> tokio::task::JoinHandle<()> {
    let reporter = Reporter::new(link, sink);
    let plugin = Arc::new(ChatterPollingPlugin::new(
        "ShokzTV",
        streams,
        chatters,
        reporter,
        DEFAULT_POLL_INTERVAL,
    ));
    tokio::spawn(plugin.run())
}

#[tokio::test(start_paused = true)]
async fn offline_channel_is_polled_on_schedule_without_chatters() {
    let streams = ScriptedStreams::new(|_| StreamStatus::Offline);
    let chatters = Arc::new(CountingChatters::default());
    let sink = Arc::new(RecordingSink::new(201));
    let task = start(streams.clone(), chatters.clone(), sink.clone());

    // Cycles at t = 0, 90 and 180.
    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(streams.calls(), 3);
    assert_eq!(chatters.calls.load(Ordering::SeqCst), 0);
    assert!(sink.payloads().is_empty());
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn live_cycles_report_each_time() {
    let streams = ScriptedStreams::new(|_| StreamStatus::Live(StreamMetrics::with_viewers(5)));
    let chatters = Arc::new(CountingChatters::default());
    let sink = Arc::new(RecordingSink::new(201));
    let task = start(streams.clone(), chatters.clone(), sink.clone());

    tokio::time::sleep(Duration::from_secs(100)).await;

    assert_eq!(chatters.calls.load(Ordering::SeqCst), 2);
    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0].chatter.joined, vec!["alice", "bob"]);
    assert_eq!(payloads[1].chatter.stayed, vec!["alice", "bob"]);
    assert!(payloads[1].chatter.joined.is_empty());
    assert_eq!(payloads[1].stream.viewers, 5);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn a_panicking_cycle_does_not_stop_the_loop() {
    let streams = ScriptedStreams::new(|call| {
        if call == 1 {
            panic!("upstream exploded");
        }
        StreamStatus::Offline
    });
    let chatters = Arc::new(CountingChatters::default());
    let task = start(streams.clone(), chatters, Arc::new(RecordingSink::new(201)));

    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(streams.calls(), 3);
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn overrunning_cycle_skips_missed_ticks() {
    let streams = ScriptedStreams::holding(Duration::from_secs(200), |_| StreamStatus::Offline);
    let chatters = Arc::new(CountingChatters::default());
    let task = start(streams.clone(), chatters, Arc::new(RecordingSink::new(201)));

    // The first cycle holds until t = 200. The overdue tick fires only once
    // it is over, so the second cycle never overlaps it.
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(streams.calls(), 1);

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(streams.calls(), 2);
    assert_eq!(streams.max_in_flight.load(Ordering::SeqCst), 1);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn failing_sink_does_not_stop_frames_or_cycles() {
    let streams = ScriptedStreams::new(|_| StreamStatus::Live(StreamMetrics::with_viewers(3)));
    let chatters = Arc::new(CountingChatters::default());
    let sink = Arc::new(RecordingSink::new(500));
    let link = Arc::new(OpenLink::default());
    let task = start_with_link(streams.clone(), chatters.clone(), sink.clone(), link.clone());

    // Cycles at t = 0, 90 and 180, every one of them rejected by the sink.
    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(streams.calls(), 3);
    assert_eq!(sink.payloads().len(), 3);

    let frames = link.frames();
    assert_eq!(frames.len(), 3);
    let first: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(
        first,
        json!({
            "viewer": {
                "chatter": {"joined": ["alice", "bob"], "stayed": [], "parted": []},
                "totalCount": 3
            },
            "type": "viewers"
        })
    );
    let last: Value = serde_json::from_str(&frames[2]).unwrap();
    assert_eq!(last["viewer"]["chatter"]["stayed"], json!(["alice", "bob"]));
    assert!(!task.is_finished());
    task.abort();
}
