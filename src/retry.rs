//! Bounded retry with linear backoff, shared by every provider invocation.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY};
use crate::error::UpstreamError;

/// How many times to try a provider call and how long to wait in between.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `base_delay * n`
    pub base_delay: Duration,
    /// Bound on each attempt, independent of the backoff
    pub attempt_timeout: Duration,
    /// When false, 401/403 end the sequence immediately
    pub retry_auth_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry_auth_failures: false,
        }
    }
}

/// Book-keeping for one retry sequence. Dropped once it succeeds or gives up.
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    max_attempts: u32,
    last_error: Option<UpstreamError>,
    delay: Duration,
}

impl RetryState {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            delay: Duration::ZERO,
        }
    }

    /// Moves to the next attempt, false once the budget is spent.
    fn advance(&mut self) -> bool {
        if self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        true
    }

    fn record(&mut self, err: UpstreamError, delay: Duration) {
        self.last_error = Some(err);
        self.delay = delay;
    }

    fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn into_error(self) -> UpstreamError {
        self.last_error
            .unwrap_or_else(|| UpstreamError::transport("retry sequence made no attempts"))
    }
}

impl RetryPolicy {
    /// Delay after a failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    fn should_retry(&self, err: &UpstreamError) -> bool {
        if err.is_auth_failure() && !self.retry_auth_failures {
            return false;
        }
        !matches!(err.kind, crate::error::UpstreamErrorKind::Unsupported)
    }

    /// Runs `attempt_fn` until it succeeds or the policy gives up, returning
    /// the last error in the latter case. `attempt_fn` gets the 1-based
    /// attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt_fn: F) -> Result<T, UpstreamError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut state = RetryState::new(self.max_attempts);

        while state.advance() {
            debug!("{label}: attempt {}/{}", state.attempt, state.max_attempts);
            let outcome =
                match tokio::time::timeout(self.attempt_timeout, attempt_fn(state.attempt)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(UpstreamError::timeout(self.attempt_timeout)),
                };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.should_retry(&err) {
                warn!(
                    "{label}: attempt {} failed permanently: {}",
                    state.attempt, err
                );
                return Err(err);
            }

            warn!(
                "{label}: attempt {}/{} failed: {}",
                state.attempt, state.max_attempts, err
            );
            let delay = self.delay_after(state.attempt);
            state.record(err, delay);
            if state.is_last_attempt() {
                break;
            }
            debug!("{label}: retrying in {}ms", state.delay.as_millis());
            tokio::time::sleep(state.delay).await;
        }

        warn!("{label}: giving up after {} attempts", state.attempt);
        Err(state.into_error())
    }
}
