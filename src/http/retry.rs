// src/http/retry.rs
//! Retry helper for fetches that may fail transiently.
//!
//! The operation receives the zero-based attempt number so callers can rotate
//! user agents between attempts.
use crate::utils::error::FetchError;
use std::future::Future;
use std::time::Duration;

/// Pause schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same pause before every retry.
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at one minute.
    Exponential(Duration),
}

impl Backoff {
    const MAX_DELAY: Duration = Duration::from_secs(60);

    /// Pause before the given retry (1 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed(pause) => *pause,
            Backoff::Exponential(base) => {
                let factor = 1u32 << retry.saturating_sub(1).min(10);
                base.saturating_mul(factor).min(Self::MAX_DELAY)
            }
        }
    }
}

/// Returns `true` for errors that are worth another attempt.
///
/// Network failures, server errors and rate limiting are retried. A 403 is
/// retried as well since a different user agent often gets through. Bad URLs
/// and 404s are final.
pub fn is_retriable(err: &FetchError) -> bool {
    match err {
        FetchError::Network(_) => true,
        FetchError::Http { status, .. } => {
            status.is_server_error()
                || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || *status == reqwest::StatusCode::FORBIDDEN
        }
        FetchError::NotPdf { .. } => true,
        FetchError::InvalidUrl(_) => false,
    }
}

/// Runs `operation` up to `max_retries + 1` times, pausing per `backoff`
/// between attempts. Non-retriable errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff: Backoff,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = backoff.delay(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_retries + 1,
                    err,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
