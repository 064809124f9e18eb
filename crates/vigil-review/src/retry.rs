use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use vigil_core::{ReviewConfig, VigilError};

/// Source of retry delays, injectable so tests do not actually wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry with exponential backoff and a rate-limit cooldown.
///
/// Attempt `n` (0-based) that fails with a retryable error is followed by a
/// wait of `initial_backoff * 2^n` plus random jitter. Rate-limit errors wait
/// an extra fixed cooldown first. Configuration and authentication errors
/// are returned immediately, and nothing waits after the last attempt.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vigil_review::retry::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(10))
///     .with_max_jitter(Duration::ZERO);
/// assert_eq!(policy.backoff(0), Duration::from_millis(100));
/// assert_eq!(policy.backoff(2), Duration::from_millis(400));
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    rate_limit_cooldown: Duration,
    max_jitter: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff", &self.initial_backoff)
            .field("rate_limit_cooldown", &self.rate_limit_cooldown)
            .field("max_jitter", &self.max_jitter)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Policy sleeping on the tokio timer, with jitter up to half the
    /// initial backoff.
    pub fn new(max_attempts: u32, initial_backoff: Duration, rate_limit_cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            rate_limit_cooldown,
            max_jitter: initial_backoff / 2,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Build the policy from review configuration.
    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_secs(config.rate_limit_cooldown_secs),
        )
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (0-based), jitter included.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::random_range(0..=jitter_ms))
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// `op` receives the 0-based attempt number. On success returns the value
    /// and the number of attempts used.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once every
    /// attempt has failed.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<(T, u32), VigilError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, VigilError>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok((value, attempt + 1)),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt + 1 >= self.max_attempts {
                warn!(attempts = self.max_attempts, error = %err, "giving up after final attempt");
                return Err(err);
            }

            if err.is_rate_limited() {
                warn!(
                    cooldown_secs = self.rate_limit_cooldown.as_secs(),
                    "rate limited, cooling down"
                );
                self.sleeper.sleep(self.rate_limit_cooldown).await;
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}
