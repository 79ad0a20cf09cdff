//! Fixed-interval polling shared by the connection gate and the login loop.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Calls `predicate` until it returns `true` or `max_attempts` calls have
/// been made. Sleeps `interval` between attempts, never before the first one
/// and never after the last one. The interval is constant.
pub async fn retry_until<F, Fut>(
    operation: &str,
    interval: Duration,
    max_attempts: u32,
    mut predicate: F,
) -> bool
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            debug!(
                operation,
                attempt,
                max_attempts,
                interval_secs = interval.as_secs(),
                "Sleeping before next attempt."
            );
            tokio::time::sleep(interval).await;
        }
        if predicate(attempt).await {
            return true;
        }
    }
    false
}
