//! # lib_common
//!
//! Shared building blocks for the chatter presence tracker. Each top-level
//! module sits behind a cargo feature of the same name so binaries only pull
//! in the stack they use (`full` enables everything).
//!
//! - **`presence`**: the membership store and the joined/stayed/parted differ.
//! - **`retrieve`**: the retrying HTTP client shared by all REST calls.
//! - **`twitch`**: stream status and chatter list sources.
//! - **`connections`**: the reconnecting WebSocket link to the backend.
//! - **`core`**: the reporter fanning a diff out to the link and the analytics sink.
//! - **`ingestors`**: the self-scheduling chatter poll loop.
//! - **`loggers`**: error telemetry forwarding.

#![forbid(unsafe_code)]

#[cfg(feature = "retrieve")]
pub mod error;

#[cfg(feature = "presence")]
pub mod presence;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "twitch")]
pub mod twitch;

#[cfg(feature = "connections")]
pub mod connections;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "retrieve")]
pub use error::TrackerError;
