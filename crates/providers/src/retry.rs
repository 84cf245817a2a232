//! Backoff policy for provider transports.
//!
//! Retries happen inside a single `send` and are invisible to the sampling
//! loop: it only ever sees the final outcome.

use std::time::Duration;

use backon::ExponentialBuilder;
use deskpilot_core::error::ProviderError;

/// Standard backoff: 1s, 2s, 4s ... capped at 30s, with jitter.
pub fn provider_backoff(max_retries: usize) -> ExponentialBuilder {
    backoff_from(Duration::from_secs(1), max_retries)
}

pub(crate) fn backoff_from(min_delay: Duration, max_retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::new()
        .with_min_delay(min_delay)
        .with_max_delay(Duration::from_secs(30))
        .with_factor(2.0)
        .with_jitter()
        .with_max_times(max_retries)
}

/// If the error is `RateLimited`, ensure the delay is at least the
/// server-requested wait.
///
/// Signature matches `backon::Retry::adjust`: returning `None` aborts the retry.
pub fn adjust_for_rate_limit(err: &ProviderError, dur: Option<Duration>) -> Option<Duration> {
    match (err, dur) {
        (ProviderError::RateLimited { retry_after_secs }, Some(d)) => {
            Some(d.max(Duration::from_secs(*retry_after_secs)))
        }
        (_, dur) => dur,
    }
}
