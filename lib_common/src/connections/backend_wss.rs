//! # Backend WSS Link
//!
//! A long-lived WebSocket client to the backend service with unbounded,
//! fixed-delay reconnection.
//!
//! ## Lifecycle
//! `Connecting -> Open -> Closed -> (delay) -> Connecting -> ...` for as long
//! as the process runs. The transitions live in [`LinkMachine`], a plain state
//! machine with no I/O, and [`BackendLink::run`] drives it from socket events:
//!
//! - **Opened**: the link becomes usable for sends.
//! - **Errored**: logged only. A close always follows, and only the close
//!   schedules a reconnect, so a failure reporting both never reconnects twice.
//! - **Closed**: exactly one reconnect is scheduled after the policy delay.
//!
//! Producers talk to the link through a cloneable [`LinkHandle`]. A send is
//! accepted only while the state is `Open`; otherwise the frame is dropped on
//! the spot. Frames still queued when a connection ends are discarded rather
//! than replayed on the next connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2500);

/// Connection state as observed by producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A connection attempt is in progress.
    Connecting,
    /// The socket is up; sends are accepted.
    Open,
    /// The last connection ended and a reconnect is pending.
    Closed,
}

/// Socket-level events fed into [`LinkMachine::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed.
    Opened,
    /// Connect, read or write failure, with its description.
    Errored(String),
    /// The connection is gone.
    Closed,
}

/// What the driver must do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Idle,
    Reconnect(Duration),
}

/// Fixed-delay, never-give-up reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    pub const fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// The delay before reconnect attempt `attempt`. Constant by definition.
    pub fn delay_for(&self, _attempt: u64) -> Duration {
        self.delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// Connection state transitions, separated from the socket.
#[derive(Debug)]
pub struct LinkMachine {
    state: LinkState,
    policy: ReconnectPolicy,
    reconnect_pending: bool,
    attempts: u64,
}

impl LinkMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: LinkState::Connecting,
            policy,
            reconnect_pending: false,
            attempts: 1,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Connection attempts started so far, the current one included.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn handle(&mut self, event: &LinkEvent) -> LinkAction {
        match event {
            LinkEvent::Opened => {
                self.state = LinkState::Open;
                LinkAction::Idle
            }
            LinkEvent::Errored(_) => LinkAction::Idle,
            LinkEvent::Closed => {
                self.state = LinkState::Closed;
                if self.reconnect_pending {
                    LinkAction::Idle
                } else {
                    self.reconnect_pending = true;
                    LinkAction::Reconnect(self.policy.delay_for(self.attempts))
                }
            }
        }
    }

    /// The scheduled reconnect fired; a new attempt starts.
    pub fn reconnect_due(&mut self) {
        self.reconnect_pending = false;
        self.state = LinkState::Connecting;
        self.attempts += 1;
    }
}

/// Result of [`PushLink::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the connection for writing.
    Queued,
    /// Discarded because the link was not open; carries the state it was in.
    Dropped(LinkState),
}

/// Best-effort outbound channel, as seen by the reporter.
pub trait PushLink: Send + Sync {
    /// Current connection state.
    fn state(&self) -> LinkState;

    /// Queues `frame` if the link is open, otherwise drops it. Never blocks.
    fn send(&self, frame: String) -> SendOutcome;
}

/// Cloneable producer side of a [`BackendLink`].
#[derive(Debug, Clone)]
pub struct LinkHandle {
    state: watch::Receiver<LinkState>,
    outbound: mpsc::UnboundedSender<String>,
}

impl LinkHandle {
    /// Resolves once the link reaches `target`. Returns `false` if the link
    /// task is gone.
    pub async fn wait_for_state(&self, target: LinkState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| *s == target).await.is_ok();
        reached
    }
}

impl PushLink for LinkHandle {
    fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    fn send(&self, frame: String) -> SendOutcome {
        match self.state() {
            LinkState::Open => match self.outbound.send(frame) {
                Ok(()) => SendOutcome::Queued,
                Err(_) => SendOutcome::Dropped(LinkState::Closed),
            },
            other => SendOutcome::Dropped(other),
        }
    }
}

/// The connection-owning side. Consumed by [`BackendLink::run`].
pub struct BackendLink {
    url: String,
    machine: LinkMachine,
    state_tx: watch::Sender<LinkState>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl BackendLink {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> (Self, LinkHandle) {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let link = Self {
            url: url.into(),
            machine: LinkMachine::new(policy),
            state_tx,
            outbound_rx,
        };
        let handle = LinkHandle {
            state: state_rx,
            outbound: outbound_tx,
        };
        (link, handle)
    }

    /// Connect, serve, reconnect. Never returns.
    pub async fn run(mut self) {
        loop {
            self.state_tx.send_replace(LinkState::Connecting);
            log::info!("Connecting to backend: {} (attempt {})", self.url, self.machine.attempts());

            let action = match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    self.apply(LinkEvent::Opened);
                    self.pump(ws_stream).await
                }
                Err(e) => {
                    self.apply(LinkEvent::Errored(e.to_string()));
                    self.apply(LinkEvent::Closed)
                }
            };

            if let LinkAction::Reconnect(delay) = action {
                tokio::time::sleep(delay).await;
            }
            self.machine.reconnect_due();
        }
    }

    /// Moves outbound frames to the socket until the connection ends.
    /// Returns the action produced by the final `Closed` event.
    async fn pump(&mut self, ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> LinkAction {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                Some(frame) = self.outbound_rx.recv() => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        self.apply(LinkEvent::Errored(e.to_string()));
                        break;
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None => break,
                        // Inbound traffic is not part of the protocol; pings
                        // are answered by tungstenite itself.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.apply(LinkEvent::Errored(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }

        let action = self.apply(LinkEvent::Closed);
        let discarded = self.discard_pending();
        if discarded > 0 {
            log::debug!("Discarded {} frame(s) queued for the closed backend connection", discarded);
        }
        action
    }

    fn apply(&mut self, event: LinkEvent) -> LinkAction {
        let action = self.machine.handle(&event);
        self.state_tx.send_replace(self.machine.state());

        match (&event, action) {
            (LinkEvent::Opened, _) => log::info!("Backend connection established"),
            (LinkEvent::Errored(e), _) => log::warn!("Backend connection error: {}", e),
            (LinkEvent::Closed, LinkAction::Reconnect(delay)) => log::error!(
                "Backend connection closed. Reconnecting in {} ms...",
                delay.as_millis()
            ),
            (LinkEvent::Closed, LinkAction::Idle) => {}
        }
        action
    }

    fn discard_pending(&mut self) -> usize {
        let mut count = 0;
        while self.outbound_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(2500);

    #[test]
    fn starts_connecting() {
        let machine = LinkMachine::new(ReconnectPolicy::fixed(DELAY));
        assert_eq!(machine.state(), LinkState::Connecting);
        assert_eq!(machine.attempts(), 1);
    }

    #[test]
    fn open_then_close_schedules_one_reconnect() {
        let mut machine = LinkMachine::new(ReconnectPolicy::fixed(DELAY));
        assert_eq!(machine.handle(&LinkEvent::Opened), LinkAction::Idle);
        assert_eq!(machine.state(), LinkState::Open);

        assert_eq!(machine.handle(&LinkEvent::Closed), LinkAction::Reconnect(DELAY));
        assert_eq!(machine.state(), LinkState::Closed);
    }

    #[test]
    fn error_alone_does_not_schedule() {
        let mut machine = LinkMachine::new(ReconnectPolicy::fixed(DELAY));
        machine.handle(&LinkEvent::Opened);
        assert_eq!(machine.handle(&LinkEvent::Errored("reset".into())), LinkAction::Idle);
        assert_eq!(machine.state(), LinkState::Open);
    }

    #[test]
    fn events_after_close_do_not_schedule_again() {
        let mut machine = LinkMachine::new(ReconnectPolicy::fixed(DELAY));
        machine.handle(&LinkEvent::Opened);
        assert_eq!(machine.handle(&LinkEvent::Closed), LinkAction::Reconnect(DELAY));

        assert_eq!(machine.handle(&LinkEvent::Errored("late".into())), LinkAction::Idle);
        assert_eq!(machine.handle(&LinkEvent::Closed), LinkAction::Idle);
        assert_eq!(machine.state(), LinkState::Closed);
    }

    #[test]
    fn delay_never_grows() {
        let mut machine = LinkMachine::new(ReconnectPolicy::fixed(DELAY));
        for attempt in 1..=50u64 {
            machine.handle(&LinkEvent::Errored("refused".into()));
            assert_eq!(machine.handle(&LinkEvent::Closed), LinkAction::Reconnect(DELAY));
            machine.reconnect_due();
            assert_eq!(machine.state(), LinkState::Connecting);
            assert_eq!(machine.attempts(), attempt + 1);
        }
    }

    #[test]
    fn handle_drops_frames_unless_open() {
        let (_link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::default());
        assert_eq!(handle.state(), LinkState::Connecting);
        assert_eq!(
            handle.send("{}".to_string()),
            SendOutcome::Dropped(LinkState::Connecting)
        );
    }

    #[tokio::test]
    async fn wait_for_state_returns_immediately_when_already_there() {
        let (_link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::default());
        assert!(handle.wait_for_state(LinkState::Connecting).await);
    }

    #[tokio::test]
    async fn wait_for_state_is_false_once_the_link_is_gone() {
        let (link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::default());
        drop(link);
        assert!(!handle.wait_for_state(LinkState::Open).await);
    }

    #[tokio::test]
    async fn failed_connect_reports_closed() {
        // Port 9 (discard) is assumed closed on the test host.
        let (link, handle) = BackendLink::new("ws://127.0.0.1:9", ReconnectPolicy::fixed(Duration::from_secs(60)));
        let task = tokio::spawn(link.run());

        let reached = tokio::time::timeout(Duration::from_secs(5), handle.wait_for_state(LinkState::Closed)).await;
        assert_eq!(reached, Ok(true));
        assert_eq!(handle.send("{}".into()), SendOutcome::Dropped(LinkState::Closed));

        task.abort();
    }
}
