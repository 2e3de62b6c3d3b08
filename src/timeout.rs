//! Timeout utilities for bounding analyzer work.
//!
//! Every per-file analyzer runs under a deadline so one pathological file
//! cannot stall a whole batch. Timed-out work is abandoned, never retried.

use crate::error::{Result, TriageError};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default per-analyzer timeout in milliseconds
pub const DEFAULT_ANALYZER_TIMEOUT_MS: u64 = 10_000;

/// A deadline for one named operation.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub millis: u64,
    /// Name used in log events.
    pub operation: String,
}

impl TimeoutConfig {
    pub fn new(millis: u64, operation: impl Into<String>) -> Self {
        Self {
            millis,
            operation: operation.into(),
        }
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(Duration::from_millis(config.millis), future).await {
        Ok(result) => {
            debug!(operation = %config.operation, "completed within deadline");
            result
        }
        Err(_) => {
            warn!(operation = %config.operation, millis = config.millis, "operation timed out");
            Err(TriageError::Timeout {
                millis: config.millis,
            })
        }
    }
}

/// Run a blocking closure on the blocking pool under a deadline.
///
/// On timeout the closure keeps running to completion in the background and
/// its result is discarded.
pub async fn blocking_with_timeout<T, F>(config: TimeoutConfig, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    with_timeout(config, async move { tokio::task::spawn_blocking(f).await? }).await
}
