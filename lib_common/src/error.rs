//! Error taxonomy for everything that talks to the outside world.
//!
//! None of these are fatal to the running process: the poll loop logs them and
//! moves on to the next cycle. Only the `servers` binary turns startup-time
//! failures (bad URLs, client build errors) into an exit.

use thiserror::Error;

/// Errors raised by the HTTP sources and sinks.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A configured URL could not be parsed or joined.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A configured value cannot be sent as an HTTP header.
    #[error("Invalid value for header {0}")]
    InvalidHeader(&'static str),

    /// The underlying `reqwest` client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// Network-level failure (DNS, connect, timeout, exhausted retries).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not valid JSON or did not match the expected shape.
    #[error("Malformed JSON payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The body was valid JSON but is missing something we rely on.
    #[error("Unexpected payload shape: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
