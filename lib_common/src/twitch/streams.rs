//! # Stream Status
//!
//! Fetches `streams/{channel_id}` from kraken and decides whether the channel
//! is live. The envelope is `{"stream": null}` while offline and
//! `{"stream": {"viewers": N, ...}}` while live.
//!
//! The full stream object is kept verbatim in [`StreamMetrics`] because the
//! analytics sink receives it unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TrackerError};
use crate::twitch::apicall::TwitchApi;

/// Metrics of a live stream.
///
/// `viewers` is lifted out for the push link; every other field of the
/// upstream object is preserved in `extra` and serialized back alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub viewers: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamMetrics {
    pub fn with_viewers(viewers: u64) -> Self {
        Self {
            viewers,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    Live(StreamMetrics),
    Offline,
}

impl StreamStatus {
    /// Interprets a kraken `streams/{id}` envelope.
    ///
    /// A missing or `null` `stream` key means offline. A live object without
    /// a non-negative integer `viewers` is rejected.
    pub fn from_envelope(envelope: Value) -> Result<Self> {
        let stream = match envelope {
            Value::Object(mut map) => map.remove("stream").unwrap_or(Value::Null),
            other => {
                return Err(TrackerError::Schema(format!(
                    "stream envelope is not an object: {}",
                    other
                )))
            }
        };

        match stream {
            Value::Null => Ok(StreamStatus::Offline),
            Value::Object(_) => {
                let metrics: StreamMetrics = serde_json::from_value(stream)?;
                Ok(StreamStatus::Live(metrics))
            }
            other => Err(TrackerError::Schema(format!("unexpected stream value: {}", other))),
        }
    }
}

/// Anything that can tell whether the tracked channel is live.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn stream_status(&self) -> Result<StreamStatus>;
}

/// Stream status of one fixed channel via kraken.
pub struct ChannelStreams {
    api: Arc<TwitchApi>,
    channel_id: String,
}

impl ChannelStreams {
    pub fn new(api: Arc<TwitchApi>, channel_id: impl Into<String>) -> Self {
        Self {
            api,
            channel_id: channel_id.into(),
        }
    }
}

#[async_trait]
impl StreamSource for ChannelStreams {
    async fn stream_status(&self) -> Result<StreamStatus> {
        let path = format!("streams/{}", self.channel_id);
        let envelope = self.api.fetch_kraken(&path).await?;
        StreamStatus::from_envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_stream_is_offline() {
        let status = StreamStatus::from_envelope(json!({"stream": null})).unwrap();
        assert_eq!(status, StreamStatus::Offline);
    }

    #[test]
    fn missing_stream_is_offline() {
        let status = StreamStatus::from_envelope(json!({"_links": {}})).unwrap();
        assert_eq!(status, StreamStatus::Offline);
    }

    #[test]
    fn live_stream_keeps_raw_fields() {
        let raw = json!({
            "_id": 23366709968u64,
            "game": "Overwatch",
            "viewers": 2123,
            "channel": {"display_name": "ShokzTV"}
        });
        let status = StreamStatus::from_envelope(json!({ "stream": raw.clone() })).unwrap();

        let StreamStatus::Live(metrics) = status else {
            panic!("expected a live stream");
        };
        assert_eq!(metrics.viewers, 2123);
        assert_eq!(serde_json::to_value(&metrics).unwrap(), raw);
    }

    #[test]
    fn live_stream_without_viewers_is_malformed() {
        let err = StreamStatus::from_envelope(json!({"stream": {"game": "x"}})).unwrap_err();
        assert!(matches!(err, TrackerError::Decode(_)));
    }

    #[test]
    fn non_object_envelope_is_malformed() {
        let err = StreamStatus::from_envelope(json!(["stream"])).unwrap_err();
        assert!(matches!(err, TrackerError::Schema(_)));
    }
}
