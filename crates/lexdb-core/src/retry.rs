//! Bounded retries with exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay_ms: u64,
    timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let base = base_delay.as_millis() as u64;
        Self { max_attempts: max_attempts.max(1), base_delay_ms: base, timeout: None }
    }

    /// Single attempt, no waiting. Used by tests and for local models.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }

    /// Run `op` until it succeeds or attempts run out; returns the last error.
    /// Each attempt is bounded by the policy timeout when one is set.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!("{what} timed out after {}ms", limit.as_millis())),
                },
                None => op().await,
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let backoff = self.delay_for_attempt(attempt);
                    tracing::debug!(what, attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        let policy = Self::new(cfg.max_attempts, Duration::from_millis(cfg.base_delay_ms));
        match cfg.timeout_secs {
            0 => policy,
            secs => policy.with_timeout(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delay_doubles_per_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn attempts_never_zero() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let p = RetryPolicy::new(3, Duration::from_millis(1));
        let out = p
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("429 too many requests")
                }
                Ok(7)
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let p = RetryPolicy::new(2, Duration::from_millis(1));
        let res: anyhow::Result<()> = p
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("connection refused")
            })
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn times_out_slow_attempts() {
        let p = RetryPolicy::none().with_timeout(Duration::from_millis(10));
        let res = p
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let err = res.expect_err("should time out");
        assert!(err.to_string().contains("timed out"));
    }
}
