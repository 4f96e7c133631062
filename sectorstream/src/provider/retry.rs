//! Retry scheduling for transient fetch failures.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{file_url, BinaryFileProvider, FetchConfig, FetchError};
use crate::telemetry::LoaderMetrics;

const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
const DEFAULT_MAX_DELAY_SECS: u64 = 5;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How failed fetch attempts are rescheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// Single attempt, no retries.
    None,
    /// Up to `max_attempts` attempts with a constant delay between them.
    Fixed { max_attempts: u32, delay: Duration },
    /// Up to `max_attempts` attempts with exponentially growing delays.
    ExponentialBackoff {
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Exponential backoff with default delays (100ms doubling, capped 5s).
    pub fn exponential(max_attempts: u32) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Total attempts allowed, always at least one.
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Fixed { max_attempts, .. }
            | RetryPolicy::ExponentialBackoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based). `None` when no further attempt is allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay = initial_delay.mul_f64(factor);
                Some(delay.min(*max_delay))
            }
        }
    }
}

/// Fetch one file, retrying transient failures per the configured policy.
///
/// Non-transient errors abort immediately. Per-attempt timeouts count as
/// transient. The last error is returned once attempts are exhausted.
pub async fn fetch_with_retry<P: BinaryFileProvider>(
    provider: &P,
    base_url: &str,
    file_name: &str,
    config: &FetchConfig,
    metrics: &LoaderMetrics,
) -> Result<Bytes, FetchError> {
    let max_attempts = config.retry.max_attempts();
    metrics.fetch_started();

    let mut last_error = FetchError::Network {
        url: file_url(base_url, file_name),
        message: "no attempt made".to_string(),
    };

    for attempt in 1..=max_attempts {
        trace!(file = file_name, attempt, "fetch attempt");

        match tokio::time::timeout(
            config.request_timeout,
            provider.get_binary_file(base_url, file_name),
        )
        .await
        {
            Ok(Ok(bytes)) => {
                debug!(file = file_name, bytes = bytes.len(), attempt, "fetch succeeded");
                metrics.fetch_completed(bytes.len() as u64);
                return Ok(bytes);
            }
            Ok(Err(error)) => {
                warn!(
                    file = file_name,
                    attempt,
                    error = %error,
                    transient = error.is_transient(),
                    "fetch attempt failed"
                );
                if !error.is_transient() {
                    metrics.fetch_failed();
                    return Err(error);
                }
                last_error = error;
            }
            Err(_) => {
                warn!(
                    file = file_name,
                    attempt,
                    timeout_ms = config.request_timeout.as_millis() as u64,
                    "fetch attempt timed out"
                );
                last_error = FetchError::Timeout {
                    url: file_url(base_url, file_name),
                    timeout: config.request_timeout,
                };
            }
        }

        if let Some(delay) = config.retry.delay_for_attempt(attempt) {
            metrics.fetch_retried();
            trace!(file = file_name, delay_ms = delay.as_millis() as u64, "backoff before retry");
            tokio::time::sleep(delay).await;
        }
    }

    metrics.fetch_failed();
    Err(last_error)
}
