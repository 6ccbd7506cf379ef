//! # Error Telemetry
//!
//! An optional `fern` output that turns every error-level record into a
//! [`TelemetryEvent`] and posts it as JSON to a collector. Records are handed
//! to a background task through an unbounded channel, so logging never waits
//! on the network.
//!
//! Forwarding failures are written to stderr. They must not go back through
//! `log`, which would feed them into this very output.

use chrono::Utc;
use log::{LevelFilter, Record};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::retrieve::ky_http::{ApiClient, ClientOptions};

/// One forwarded log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub app: String,
    pub pid: u32,
    pub host: String,
    pub level: String,
    pub target: String,
    pub message: String,
    /// RFC 3339, UTC.
    pub ts: String,
}

impl TelemetryEvent {
    pub fn from_record(app: &str, host: &str, record: &Record<'_>) -> Self {
        Self {
            app: app.to_string(),
            pid: std::process::id(),
            host: host.to_string(),
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            ts: Utc::now().to_rfc3339(),
        }
    }
}

/// Producer side of the forwarder.
#[derive(Debug, Clone)]
pub struct Telemetry {
    app: String,
    host: String,
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl Telemetry {
    /// Builds the collector client and spawns the forwarding task. Must be
    /// called from within a Tokio runtime.
    pub fn spawn(url: &str, app: &str, mut options: ClientOptions) -> Result<(Self, JoinHandle<()>)> {
        options.max_retries = 0;
        let client = ApiClient::new(url, options)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let handle = tokio::spawn(forward(client, rx));
        let telemetry = Self {
            app: app.to_string(),
            host,
            tx,
        };
        Ok((telemetry, handle))
    }

    /// Queues a record for forwarding. Returns `false` once the forwarder
    /// has stopped.
    pub fn record(&self, record: &Record<'_>) -> bool {
        self.tx
            .send(TelemetryEvent::from_record(&self.app, &self.host, record))
            .is_ok()
    }

    /// A dispatch forwarding error-level records, ready to be chained into
    /// the root `fern::Dispatch`. It must be chained unformatted so the
    /// message arrives without the console prefix.
    pub fn dispatch(self) -> fern::Dispatch {
        fern::Dispatch::new()
            .level(LevelFilter::Error)
            // The HTTP stack's own records must not trigger more posts.
            .filter(|meta| !is_transport_target(meta.target()))
            .chain(fern::Output::call(move |record| {
                if !self.record(record) {
                    eprintln!("Telemetry forwarder stopped; dropping: {}", record.args());
                }
            }))
    }
}

fn is_transport_target(target: &str) -> bool {
    ["reqwest", "hyper", "h2", "rustls", "native_tls"]
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

async fn forward(client: ApiClient, mut rx: mpsc::UnboundedReceiver<TelemetryEvent>) {
    while let Some(event) = rx.recv().await {
        match client.post_json("", &event).await {
            Ok(status) if (200..300).contains(&status) => {}
            Ok(status) => eprintln!("Telemetry collector rejected event: status {}", status),
            Err(e) => eprintln!("Failed to forward telemetry event: {}", e),
        }
    }
}

/// Routes panics through `log::error!` before the previous hook runs, so a
/// configured telemetry output sees them as well.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("Panic: {}", info);
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn event_carries_record_fields() {
        let event = TelemetryEvent::from_record(
            "server_chatters",
            "box-1",
            &Record::builder()
                .level(Level::Error)
                .target("lib_common::core::reporter")
                .args(format_args!("status {}", 500))
                .build(),
        );

        assert_eq!(event.app, "server_chatters");
        assert_eq!(event.host, "box-1");
        assert_eq!(event.level, "ERROR");
        assert_eq!(event.target, "lib_common::core::reporter");
        assert_eq!(event.message, "status 500");
        assert_eq!(event.pid, std::process::id());
        assert!(chrono::DateTime::parse_from_rfc3339(&event.ts).is_ok());
    }

    #[test]
    fn transport_targets_are_filtered() {
        assert!(is_transport_target("hyper_util::client::legacy"));
        assert!(is_transport_target("reqwest::connect"));
        assert!(!is_transport_target("server_chatters"));
    }
}
