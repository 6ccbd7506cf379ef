//! # Data Retrieval Module
//!
//! A centralized location for the HTTP client shared by every REST
//! interaction: the stream status and chatter list fetches, the analytics
//! sink and the telemetry forwarder.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with an optional transient-retry policy and
//!   standardized JSON response handling.

#![forbid(unsafe_code)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse, ClientOptions};
