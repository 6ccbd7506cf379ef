//! # Shared Test Support
//!
//! Fakes and helpers used by more than one integration test target.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use lib_common::core::{AnalyticsPayload, AnalyticsSink};
use lib_common::error::Result;

/// An analytics sink that answers with a fixed status and remembers every
/// payload it was given.
pub struct RecordingSink {
    status: u16,
    payloads: Mutex<Vec<AnalyticsPayload>>,
}

impl RecordingSink {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn payloads(&self) -> Vec<AnalyticsPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn submit(&self, payload: &AnalyticsPayload) -> Result<u16> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(self.status)
    }
}

/// Polls `check` every 20 ms until it returns `true` or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
