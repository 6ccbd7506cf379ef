//! # Data Ingestors Module
//!
//! Ingestion clients that pull data from upstream on their own schedule.
//!
//! ## Contained Modules:
//! - **`chatter_polling`**: A fixed-period REST poller. Each cycle checks
//!   whether the channel is live, fetches the chatter list, diffs it against the
//!   previous cycle and hands the result to the reporter.

#![forbid(unsafe_code)]

/// The self-scheduling chatter poll loop.
pub mod chatter_polling;

pub use chatter_polling::{ChatterPollingPlugin, CycleOutcome, DEFAULT_POLL_INTERVAL};
