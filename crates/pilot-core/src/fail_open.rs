//! Fail-open utilities for graceful degradation
//!
//! Use these for infrastructure side effects like the activity log, where a
//! failure must never change the outcome of a command.
//!
//! DO NOT use fail-open for:
//! - Oracle calls (decisions)
//! - Action execution (outcomes are recorded, not dropped)
//! - Screen capture (the oracle cannot decide blind)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Await an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use pilot_core::fail_open::fail_open;
/// use pilot_core::Result;
///
/// async fn append_trace() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("activity_logger", append_trace()).await;
///     // written is None if append_trace() failed
/// }
/// ```
pub async fn fail_open<Fut, T>(operation_name: &str, operation: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T>>,
{
    match operation.await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
