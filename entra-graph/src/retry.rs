//! Retry policy and the shared throttle gate for Graph requests.

use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Bounded exponential backoff for transient Graph failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 429 and 5xx are transient; everything else is surfaced immediately.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Delay before the retry that follows `attempt` (1-based).
    ///
    /// A server-provided `Retry-After` wins when it is longer than the
    /// computed backoff. The result never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let delay = match retry_after {
            Some(retry_after) => backoff.max(retry_after),
            None => backoff,
        };
        delay.min(self.max_delay)
    }
}

/// Parses a `Retry-After` header. Only the delta-seconds form is supported.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Gate shared by every request issued through one client.
///
/// A rate-limit response from any caller pushes `resume_at` forward, and all
/// callers wait for it before sending their next request.
#[derive(Debug, Default)]
pub struct Throttle {
    resume_at: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until any active backoff window has passed.
    pub async fn wait(&self) {
        let resume_at = *self.resume_at.lock().await;
        if let Some(resume_at) = resume_at {
            if resume_at > Instant::now() {
                debug!(
                    wait_ms = (resume_at - Instant::now()).as_millis() as u64,
                    "Waiting for rate limit backoff"
                );
                tokio::time::sleep_until(resume_at).await;
            }
        }
    }

    /// Extends the backoff window to at least `delay` from now.
    pub async fn back_off(&self, delay: Duration) {
        let candidate = Instant::now() + delay;
        let mut resume_at = self.resume_at.lock().await;
        if resume_at.map_or(true, |current| candidate > current) {
            *resume_at = Some(candidate);
        }
    }

    /// Whether a backoff window is currently active.
    pub async fn is_throttled(&self) -> bool {
        self.resume_at
            .lock()
            .await
            .is_some_and(|resume_at| resume_at > Instant::now())
    }
}
