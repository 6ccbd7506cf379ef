//! # Core Module
//!
//! Glue between a computed presence diff and the two downstream consumers.
//!
//! - **`reporter`**: serializes a diff into the push-link frame and the
//!   analytics payload, sends the first over the backend link when it is open
//!   and posts the second to the analytics sink on a detached task.

#![forbid(unsafe_code)]

/// Fans a diff out to the backend link and the analytics sink.
pub mod reporter;

pub use reporter::{AnalyticsPayload, AnalyticsSink, Delivery, LinkFrame, Reporter, WebserviceSink};
