// Retry loop for windows that are not mapped yet

use crate::config::RetryConfig;
use crate::error::SlotResult;
use crate::wm::{WindowAdjuster, WindowGeometry};
use std::time::Duration;

/// Delay before retry number `attempt` (0-based): exponential from the base
/// delay, capped, with up to 25% random jitter on top.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = retry
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(retry.max_delay_ms);
    let jitter = if exp >= 4 { fastrand::u64(0..=exp / 4) } else { 0 };
    Duration::from_millis(exp + jitter)
}

/// Apply `geom` to the window titled `title`, retrying transient failures.
///
/// Gives up after `retry.attempts` tries and returns the last error.
/// Non-transient errors are returned immediately.
pub fn adjust_with_retry<A>(
    adjuster: &A,
    title: &str,
    geom: &WindowGeometry,
    retry: &RetryConfig,
) -> SlotResult<()>
where
    A: WindowAdjuster + ?Sized,
{
    let attempts = retry.attempts.max(1);
    let mut attempt = 0;

    loop {
        match adjuster.adjust(title, geom) {
            Ok(()) => {
                if attempt > 0 {
                    tracing::debug!(
                        "wm::{} - Placed '{}' after {} retries",
                        adjuster.name(),
                        title,
                        attempt
                    );
                }
                return Ok(());
            }
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = backoff_delay(retry, attempt);
                tracing::debug!(
                    "wm::{} - '{}' not placed ({}), retrying in {}ms",
                    adjuster.name(),
                    title,
                    e,
                    delay.as_millis()
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "wm::{} - Giving up on '{}' after {} attempts: {}",
                    adjuster.name(),
                    title,
                    attempt + 1,
                    e
                );
                return Err(e);
            }
        }
    }
}
