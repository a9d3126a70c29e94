//! Bounded retries for portal requests.

use crate::portal::error::PortalError;
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// The same delay after every failed attempt.
    Fixed(Duration),
    /// `initial * factor^(attempt - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let scaled = initial.as_secs_f64() * factor.max(1.0).powi(exponent);
                if scaled.is_finite() && scaled < max.as_secs_f64() {
                    Duration::from_secs_f64(scaled)
                } else {
                    max
                }
            }
        }
    }
}

/// How often, how patiently and for which errors a request is retried.
///
/// The default mirrors the portal harvester's historical behaviour: three attempts,
/// two seconds apart, whatever the failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retry_if: fn(&PortalError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(2)),
            retry_if: retry_any,
        }
    }
}

/// Retry predicate accepting every error.
pub fn retry_any(_: &PortalError) -> bool {
    true
}

/// Retry predicate that gives up immediately on client errors (4xx other than 429)
/// and local cache failures.
pub fn retry_transient(error: &PortalError) -> bool {
    match error {
        PortalError::HttpStatus { status, .. } => {
            status.is_server_error() || status.as_u16() == 429
        }
        PortalError::Cache(_) | PortalError::ClientBuild(_) => false,
        _ => true,
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            ..Self::default()
        }
    }

    pub fn with_predicate(self, retry_if: fn(&PortalError) -> bool) -> Self {
        Self { retry_if, ..self }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the attempt
    /// budget is spent. Exhaustion wraps the last error in
    /// [`PortalError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, PortalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortalError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !(self.retry_if)(&e) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(PortalError::RetriesExhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!(
                        "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, max_attempts, label, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
