use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::CaptureResult;

/// One network exchange seen by the browser during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedExchange {
    pub url: String,
    pub responded: bool,
}

impl ObservedExchange {
    pub fn new(url: impl Into<String>, responded: bool) -> Self {
        Self {
            url: url.into(),
            responded,
        }
    }
}

/// A live browser owned by a single resolution.
#[async_trait]
pub trait CaptureSession: Send {
    async fn navigate(&mut self, url: &str) -> CaptureResult<()>;

    /// Moves the pointer to `offset` inside the page body and clicks.
    async fn interact(&mut self, offset: (f64, f64)) -> CaptureResult<()>;

    /// Waits for `window`, then returns every exchange observed so far.
    async fn observe(&mut self, window: Duration) -> CaptureResult<Vec<ObservedExchange>>;

    /// Tears the browser down. Must be safe to call more than once.
    async fn release(&mut self) -> CaptureResult<()>;
}

#[async_trait]
pub trait CaptureSessionFactory: Send + Sync {
    async fn open(&self) -> CaptureResult<Box<dyn CaptureSession>>;
}
