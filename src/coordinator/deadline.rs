//! Wall-clock budget for generation calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{DaemonError, Result};

/// Races `call` against `limit`.
///
/// If the limit elapses first the call future is dropped and a
/// GENERATION_TIMEOUT error comes back. Dropping an offloaded call only
/// abandons it; the blocking work itself keeps running.
pub async fn with_deadline<F, T>(call: F, limit: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DaemonError::generation_timeout(limit)),
    }
}
