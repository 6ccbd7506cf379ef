//! # Reporter
//!
//! Given a diff and the current stream metrics, the reporter:
//!
//! 1. sends a `viewers` frame over the backend link if, and only if, the link
//!    is open at that moment (no queueing, no ack, no retry);
//! 2. posts the diff together with the raw stream object to the analytics
//!    sink on a spawned task. `201 Created` is success; anything else is
//!    logged and forgotten.
//!
//! Neither path reports back to the poll loop. [`Reporter::report`] hands out
//! the delivery's `JoinHandle` only so tests can observe it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::connections::backend_wss::{PushLink, SendOutcome};
use crate::error::Result;
use crate::presence::DiffResult;
use crate::retrieve::ky_http::{ApiClient, ClientOptions};
use crate::twitch::streams::StreamMetrics;

/// Status the analytics sink answers with when a record was stored.
pub const SAVED_STATUS: u16 = 201;

/// `{"viewer": {...}, "type": "viewers"}` sent over the push link.
#[derive(Debug, Clone, Serialize)]
pub struct LinkFrame<'a> {
    pub viewer: ViewerUpdate<'a>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerUpdate<'a> {
    pub chatter: &'a DiffResult,
    pub total_count: u64,
}

impl<'a> LinkFrame<'a> {
    pub fn viewers(diff: &'a DiffResult, metrics: &StreamMetrics) -> Self {
        Self {
            viewer: ViewerUpdate {
                chatter: diff,
                total_count: metrics.viewers,
            },
            kind: "viewers",
        }
    }
}

/// Body posted to the analytics sink.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsPayload {
    pub chatter: DiffResult,
    pub stream: StreamMetrics,
}

/// Result of one analytics delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Saved,
    Rejected(u16),
    Failed(String),
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Posts one payload and returns the HTTP status.
    async fn submit(&self, payload: &AnalyticsPayload) -> Result<u16>;
}

/// The configured webservice endpoint.
pub struct WebserviceSink {
    client: ApiClient,
}

impl WebserviceSink {
    /// Analytics records are never retried: a retried POST could store the
    /// same diff twice. `options.max_retries` is overridden to zero.
    pub fn new(webservice_url: &str, mut options: ClientOptions) -> Result<Self> {
        options.max_retries = 0;
        Ok(Self {
            client: ApiClient::new(webservice_url, options)?,
        })
    }
}

#[async_trait]
impl AnalyticsSink for WebserviceSink {
    async fn submit(&self, payload: &AnalyticsPayload) -> Result<u16> {
        self.client.post_json("", payload).await
    }
}

pub struct Reporter {
    link: Arc<dyn PushLink>,
    sink: Arc<dyn AnalyticsSink>,
}

impl Reporter {
    pub fn new(link: Arc<dyn PushLink>, sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { link, sink }
    }

    /// Must be called from within a Tokio runtime.
    pub fn report(&self, diff: DiffResult, metrics: StreamMetrics) -> JoinHandle<Delivery> {
        self.push(&diff, &metrics);

        let sink = Arc::clone(&self.sink);
        let payload = AnalyticsPayload {
            chatter: diff,
            stream: metrics,
        };
        tokio::spawn(async move { deliver(sink.as_ref(), &payload).await })
    }

    fn push(&self, diff: &DiffResult, metrics: &StreamMetrics) {
        let frame = match serde_json::to_string(&LinkFrame::viewers(diff, metrics)) {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to serialize viewers frame: {}", e);
                return;
            }
        };

        match self.link.send(frame) {
            SendOutcome::Queued => log::debug!("Viewers frame queued for the backend"),
            SendOutcome::Dropped(state) => {
                log::debug!("Backend link is {:?}, viewers frame dropped", state)
            }
        }
    }
}

async fn deliver(sink: &dyn AnalyticsSink, payload: &AnalyticsPayload) -> Delivery {
    match sink.submit(payload).await {
        Ok(SAVED_STATUS) => {
            log::info!("Saved chatters and analytics");
            Delivery::Saved
        }
        Ok(status) => {
            log::error!("Error while saving chatters and analytics: status {}", status);
            Delivery::Rejected(status)
        }
        Err(e) => {
            log::error!("Error while saving chatters and analytics: {}", e);
            Delivery::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::connections::backend_wss::LinkState;
    use crate::error::TrackerError;

    struct FakeLink {
        state: LinkState,
        sent: Mutex<Vec<String>>,
    }

    impl FakeLink {
        fn new(state: LinkState) -> Arc<Self> {
            Arc::new(Self {
                state,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl PushLink for FakeLink {
        fn state(&self) -> LinkState {
            self.state
        }

        fn send(&self, frame: String) -> SendOutcome {
            if self.state != LinkState::Open {
                return SendOutcome::Dropped(self.state);
            }
            self.sent.lock().unwrap().push(frame);
            SendOutcome::Queued
        }
    }

    struct FixedSink(std::result::Result<u16, &'static str>);

    #[async_trait]
    impl AnalyticsSink for FixedSink {
        async fn submit(&self, _payload: &AnalyticsPayload) -> Result<u16> {
            self.0.map_err(|msg| TrackerError::Schema(msg.to_string()))
        }
    }

    fn sample_diff() -> DiffResult {
        DiffResult {
            joined: vec!["c".into()],
            stayed: vec!["b".into()],
            parted: vec!["a".into()],
        }
    }

    #[test]
    fn link_frame_shape() {
        let diff = sample_diff();
        let frame = LinkFrame::viewers(&diff, &StreamMetrics::with_viewers(42));
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "viewer": {
                    "chatter": {"joined": ["c"], "stayed": ["b"], "parted": ["a"]},
                    "totalCount": 42
                },
                "type": "viewers"
            })
        );
    }

    #[test]
    fn analytics_payload_keeps_raw_stream() {
        let stream: StreamMetrics =
            serde_json::from_value(json!({"viewers": 7, "game": "Overwatch", "_id": 1})).unwrap();
        let payload = AnalyticsPayload {
            chatter: sample_diff(),
            stream,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "chatter": {"joined": ["c"], "stayed": ["b"], "parted": ["a"]},
                "stream": {"viewers": 7, "game": "Overwatch", "_id": 1}
            })
        );
    }

    #[tokio::test]
    async fn open_link_gets_frame_and_sink_saves() {
        let link = FakeLink::new(LinkState::Open);
        let reporter = Reporter::new(link.clone(), Arc::new(FixedSink(Ok(201))));

        let delivery = reporter.report(sample_diff(), StreamMetrics::with_viewers(3)).await.unwrap();

        assert_eq!(delivery, Delivery::Saved);
        let sent = link.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("\"totalCount\":3"));
    }

    #[tokio::test]
    async fn closed_link_skips_frame_but_still_posts() {
        let link = FakeLink::new(LinkState::Closed);
        let reporter = Reporter::new(link.clone(), Arc::new(FixedSink(Ok(201))));

        let delivery = reporter.report(sample_diff(), StreamMetrics::with_viewers(3)).await.unwrap();

        assert_eq!(delivery, Delivery::Saved);
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_created_status_is_rejected() {
        let link = FakeLink::new(LinkState::Open);
        let reporter = Reporter::new(link.clone(), Arc::new(FixedSink(Ok(500))));
        let delivery = reporter.report(sample_diff(), StreamMetrics::with_viewers(1)).await.unwrap();
        assert_eq!(delivery, Delivery::Rejected(500));
        // The frame goes out regardless of what the sink answers.
        assert_eq!(link.sent.lock().unwrap().len(), 1);

        let reporter = Reporter::new(FakeLink::new(LinkState::Open), Arc::new(FixedSink(Ok(200))));
        let delivery = reporter.report(sample_diff(), StreamMetrics::with_viewers(1)).await.unwrap();
        assert_eq!(delivery, Delivery::Rejected(200));
    }

    #[tokio::test]
    async fn transport_failure_is_reported_not_propagated() {
        let reporter = Reporter::new(
            FakeLink::new(LinkState::Open),
            Arc::new(FixedSink(Err("connection refused"))),
        );
        let delivery = reporter.report(sample_diff(), StreamMetrics::with_viewers(1)).await.unwrap();
        assert!(matches!(delivery, Delivery::Failed(reason) if reason.contains("connection refused")));
    }
}
