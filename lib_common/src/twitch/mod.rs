//! # Twitch API Integration Module
//!
//! Upstream sources for the poll loop.
//!
//! ## Contained Modules:
//!
//! - **`apicall`**: The low-level client for the v5 ("kraken") REST API. It
//!   injects the `Client-ID` and versioned `Accept` headers on every call.
//! - **`streams`**: The stream status source: live with a viewer count, or
//!   offline.
//! - **`chatters`**: The chatter list source and its category envelope.
//!
//! Both sources sit behind small traits (`StreamSource`, `ChatterSource`) so
//! the poll loop can be driven by fakes in tests.

#![forbid(unsafe_code)]

/// Client for the Twitch v5 REST API.
pub mod apicall;
/// Chatter list model and source.
pub mod chatters;
/// Stream status model and source.
pub mod streams;

pub use apicall::TwitchApi;
pub use chatters::{ChatterCategories, ChatterList, ChatterSource, ChattersEnvelope};
pub use streams::{ChannelStreams, StreamMetrics, StreamSource, StreamStatus};
