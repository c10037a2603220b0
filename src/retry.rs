//! Bounded exponential backoff around any fallible async operation.
//!
//! [`retry_with_backoff`] is deliberately ignorant of what it retries: it
//! takes a closure producing a future and a [`RetryPolicy`], and knows nothing
//! about OCR, page ranges or HTTP. The conversion pipeline wraps its
//! top-level entry point with it; the page-splitting logic in
//! [`crate::convert`] never calls it, so a split failure is retried as a whole
//! document rather than per sub-range.
//!
//! ## Delay schedule
//!
//! After the `n`-th consecutive failure the wrapper sleeps
//! `min(base_delay * exponential_base^(n - 1), max_delay)`, optionally scaled
//! by a uniform factor in `[0.5, 1.0)`. With `base_delay = 2s`,
//! `exponential_base = 3` and no jitter the waits are 2 s, 6 s, 18 s, …

use crate::config::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

impl RetryPolicy {
    /// Un-jittered delay after `failures` consecutive failures (1-based).
    ///
    /// Saturates at `max_delay` instead of overflowing for large counts.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Apply jitter (when enabled) to a delay computed by [`Self::delay_for`].
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            delay.mul_f64(0.5 + fastrand::f64() * 0.5)
        } else {
            delay
        }
    }
}

/// Run `op` until it succeeds or `policy.max_retries` attempts have failed.
///
/// `label` only appears in log lines. Each intermediate failure is logged at
/// WARN with the upcoming delay; the final failure is logged at ERROR and the
/// operation's own error is returned unchanged.
///
/// # Example
/// ```rust
/// use arxiv2md::{retry_with_backoff, RetryPolicy};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let policy = RetryPolicy::builder()
///     .max_retries(2)
///     .base_delay(Duration::from_millis(1))
///     .max_delay(Duration::from_millis(1))
///     .jitter(false)
///     .build()
///     .unwrap();
///
/// let mut calls = 0;
/// let out: Result<u32, String> = retry_with_backoff(&policy, "demo", || {
///     calls += 1;
///     let n = calls;
///     async move { if n < 2 { Err("flaky".to_string()) } else { Ok(n) } }
/// })
/// .await;
/// assert_eq!(out, Ok(2));
/// # }
/// ```
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max = policy.max_retries.max(1);
    let mut failures: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failures += 1;
                if failures >= max {
                    error!("{label}: failed after {max} attempts. Final error: {e}");
                    return Err(e);
                }

                let delay = policy.jittered(policy.delay_for(failures));
                warn!(
                    "{label}: attempt {failures} failed. Retrying in {:.2} seconds... Error: {e}",
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
