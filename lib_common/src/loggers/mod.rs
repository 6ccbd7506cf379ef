/// Forwards error-level log records to a remote telemetry endpoint.
pub mod telemetry;

pub use telemetry::{install_panic_hook, Telemetry, TelemetryEvent};
