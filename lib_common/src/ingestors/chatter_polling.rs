//! # Chatter Polling Ingestor
//!
//! A self-scheduling ingestor for the REST chatter and stream endpoints, which
//! offer no streaming interface.
//!
//! ## Key Design Principles:
//! - **Fixed cadence**: cycles start every `interval`, measured from cycle
//!   start. The first cycle fires immediately.
//! - **Single flight**: a cycle that overruns its period makes the missed ticks
//!   get skipped, so two cycles never run at once and the differ is never
//!   raced.
//! - **Resilience**: every upstream failure ends the current cycle with a log
//!   line. Each cycle runs on its own task, so even a panic inside a source or
//!   the reporter only costs that cycle.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::core::reporter::Reporter;
use crate::presence::{DiffResult, PresenceDiffer};
use crate::twitch::chatters::ChatterSource;
use crate::twitch::streams::{StreamSource, StreamStatus};

/// Time between cycle starts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(90);

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Live; the diff was computed and handed to the reporter.
    Reported(DiffResult),
    /// Not live; chatters were not fetched and membership is unchanged.
    Offline,
    /// The stream status could not be fetched or decoded.
    StreamUnavailable,
    /// Live, but the chatter list could not be fetched or decoded.
    ChattersUnavailable,
}

/// # Chatter Polling Plugin
///
/// Owns the presence differ for the lifetime of the process.
pub struct ChatterPollingPlugin {
    channel_name: String,
    streams: Arc<dyn StreamSource>,
    chatters: Arc<dyn ChatterSource>,
    reporter: Reporter,
    differ: Mutex<PresenceDiffer>,
    interval: Duration,
}

impl ChatterPollingPlugin {
    pub fn new(
        channel_name: impl Into<String>,
        streams: Arc<dyn StreamSource>,
        chatters: Arc<dyn ChatterSource>,
        reporter: Reporter,
        interval: Duration,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            streams,
            chatters,
            reporter,
            differ: Mutex::new(PresenceDiffer::new()),
            interval,
        }
    }

    /// # Main Execution Loop
    ///
    /// Runs forever. A cycle that errors or panics is logged and the loop
    /// waits for the next tick.
    pub async fn run(self: Arc<Self>) {
        log::info!(
            "Chatter polling started for {} (every {}s)",
            self.channel_name,
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let plugin = Arc::clone(&self);
            match tokio::spawn(async move { plugin.run_cycle().await }).await {
                Ok(outcome) => log::debug!("Poll cycle finished: {:?}", outcome),
                Err(e) => log::error!("Poll cycle aborted: {}", e),
            }
        }
    }

    /// Executes one poll cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let metrics = match self.streams.stream_status().await {
            Ok(StreamStatus::Live(metrics)) => metrics,
            Ok(StreamStatus::Offline) => {
                log::info!("{} is offline", self.channel_name);
                return CycleOutcome::Offline;
            }
            Err(e) => {
                log::error!("Failed to fetch stream data: {}", e);
                return CycleOutcome::StreamUnavailable;
            }
        };

        log::info!("{} is online with {} viewers", self.channel_name, metrics.viewers);

        let envelope = match self.chatters.chatters().await {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Failed to fetch chatters: {}", e);
                return CycleOutcome::ChattersUnavailable;
            }
        };

        // Poison from a panicked cycle is ignored; the next diff resyncs the store.
        let diff = self
            .differ
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .diff(envelope.chatters.flatten());

        log::info!(
            "Chatters: {} joined, {} stayed, {} parted",
            diff.joined.len(),
            diff.stayed.len(),
            diff.parted.len()
        );

        // Delivery is fire-and-forget; the handle is dropped.
        let _ = self.reporter.report(diff.clone(), metrics);
        CycleOutcome::Reported(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::connections::backend_wss::{LinkState, PushLink, SendOutcome};
    use crate::core::reporter::{AnalyticsPayload, AnalyticsSink};
    use crate::error::{Result, TrackerError};
    use crate::twitch::chatters::{ChatterCategories, ChattersEnvelope};
    use crate::twitch::streams::StreamMetrics;

    struct ScriptedStreams(Mutex<Vec<Result<StreamStatus>>>);

    #[async_trait]
    impl StreamSource for ScriptedStreams {
        async fn stream_status(&self) -> Result<StreamStatus> {
            self.0.lock().unwrap().remove(0)
        }
    }

    struct ScriptedChatters {
        calls: AtomicUsize,
        lists: Mutex<Vec<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ChatterSource for ScriptedChatters {
        async fn chatters(&self) -> Result<ChattersEnvelope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let viewers = self.lists.lock().unwrap().remove(0);
            Ok(ChattersEnvelope {
                chatters: ChatterCategories {
                    viewers: viewers.into_iter().map(String::from).collect(),
                    ..Default::default()
                },
            })
        }
    }

    struct ClosedLink;

    impl PushLink for ClosedLink {
        fn state(&self) -> LinkState {
            LinkState::Closed
        }

        fn send(&self, _frame: String) -> SendOutcome {
            SendOutcome::Dropped(LinkState::Closed)
        }
    }

    struct CreatedSink;

    #[async_trait]
    impl AnalyticsSink for CreatedSink {
        async fn submit(&self, _payload: &AnalyticsPayload) -> Result<u16> {
            Ok(201)
        }
    }

    fn plugin(
        statuses: Vec<Result<StreamStatus>>,
        lists: Vec<Vec<&'static str>>,
    ) -> (ChatterPollingPlugin, Arc<ScriptedChatters>) {
        let chatters = Arc::new(ScriptedChatters {
            calls: AtomicUsize::new(0),
            lists: Mutex::new(lists),
        });
        let plugin = ChatterPollingPlugin::new(
            "ShokzTV",
            Arc::new(ScriptedStreams(Mutex::new(statuses))),
            chatters.clone(),
            Reporter::new(Arc::new(ClosedLink), Arc::new(CreatedSink)),
            DEFAULT_POLL_INTERVAL,
        );
        (plugin, chatters)
    }

    fn live(viewers: u64) -> Result<StreamStatus> {
        Ok(StreamStatus::Live(StreamMetrics::with_viewers(viewers)))
    }

    #[tokio::test]
    async fn consecutive_live_cycles_diff_against_each_other() {
        let (plugin, _) = plugin(vec![live(2), live(2)], vec![vec!["a", "b"], vec!["b", "c"]]);

        let first = plugin.run_cycle().await;
        assert_eq!(
            first,
            CycleOutcome::Reported(DiffResult {
                joined: vec!["a".into(), "b".into()],
                stayed: vec![],
                parted: vec![],
            })
        );

        let second = plugin.run_cycle().await;
        assert_eq!(
            second,
            CycleOutcome::Reported(DiffResult {
                joined: vec!["c".into()],
                stayed: vec!["b".into()],
                parted: vec!["a".into()],
            })
        );
    }

    #[tokio::test]
    async fn offline_skips_chatters() {
        let (plugin, chatters) = plugin(vec![Ok(StreamStatus::Offline)], vec![]);
        assert_eq!(plugin.run_cycle().await, CycleOutcome::Offline);
        assert_eq!(chatters.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stream_failure_skips_chatters() {
        let (plugin, chatters) = plugin(vec![Err(TrackerError::Schema("bad".into()))], vec![]);
        assert_eq!(plugin.run_cycle().await, CycleOutcome::StreamUnavailable);
        assert_eq!(chatters.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offline_cycle_keeps_membership() {
        let (plugin, _) = plugin(
            vec![live(1), Ok(StreamStatus::Offline), live(1)],
            vec![vec!["a"], vec!["a"]],
        );
        plugin.run_cycle().await;
        plugin.run_cycle().await;

        let CycleOutcome::Reported(diff) = plugin.run_cycle().await else {
            panic!("expected a report");
        };
        assert_eq!(diff.stayed, vec!["a".to_string()]);
        assert!(diff.joined.is_empty());
    }
}
