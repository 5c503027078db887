use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry immediately.
    #[default]
    Immediate,
    /// Retry after a fixed delay.
    Delay(Duration),
    /// Retry after a delay that doubles on every attempt.
    Exponential(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Retries after the first attempt. If `None`, retries are unlimited.
    pub max_retries: Option<usize>,
    pub policy: RetryPolicy,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryOptions {
    pub const fn new() -> Self {
        Self {
            max_retries: None,
            policy: RetryPolicy::Immediate,
        }
    }

    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Delay to wait after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        match self.policy {
            RetryPolicy::Immediate => Duration::ZERO,
            RetryPolicy::Delay(delay) => delay,
            RetryPolicy::Exponential(delay) => {
                let factor = 2u32.saturating_pow(attempt.min(16) as u32);
                delay.saturating_mul(factor)
            }
        }
    }
}

/// Runs `f` until it succeeds or the retry budget is spent. `f` receives the
/// attempt number, starting at 0.
pub async fn retry_async<T, E, F, Fut>(options: RetryOptions, msg: &str, mut f: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;

    loop {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!("{msg} (attempt {}): {err}", attempt + 1);

                if options.max_retries.is_some_and(|max| attempt >= max) {
                    return Err(err);
                }

                let delay = options.delay_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn exponential_delays() {
        let options = RetryOptions::new().with_policy(RetryPolicy::Exponential(Duration::from_millis(100)));
        assert_eq!(options.delay_for(0), Duration::from_millis(100));
        assert_eq!(options.delay_for(1), Duration::from_millis(200));
        assert_eq!(options.delay_for(3), Duration::from_millis(800));

        let fixed = RetryOptions::new().with_policy(RetryPolicy::Delay(Duration::from_secs(1)));
        assert_eq!(fixed.delay_for(5), Duration::from_secs(1));
        assert_eq!(RetryOptions::default().delay_for(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let calls = AtomicUsize::new(0);
        let options = RetryOptions::new().with_max_retries(3);

        let result: Result<usize, String> = retry_async(options, "flaky", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let options = RetryOptions::new().with_max_retries(2);

        let result: Result<(), String> = retry_async(options, "always fails", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        })
        .await;

        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts() {
        let options = RetryOptions::new()
            .with_max_retries(1)
            .with_policy(RetryPolicy::Delay(Duration::from_secs(30)));

        let start = tokio::time::Instant::now();
        let _: Result<(), &str> = retry_async(options, "slow", |_| async { Err("nope") }).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
