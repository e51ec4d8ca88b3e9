//! Utility functions and helpers

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::shared::types::Amount;

/// Format amount with proper decimals
pub fn format_amount(amount: Amount, decimals: u8) -> String {
    let scale = 10u128.checked_pow(decimals as u32).unwrap_or(u128::MAX);
    let whole = amount / scale;
    let frac = amount % scale;
    if decimals == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    let shown = &frac[..frac.len().min(6)];
    format!("{}.{}", whole, shown)
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Retry policy for network reads
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for `attempt` (0-based) with up to 50% random jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter_ms = if exp_ms > 1 {
            rand::thread_rng().gen_range(0..=exp_ms / 2)
        } else {
            0
        };
        Duration::from_millis(exp_ms + jitter_ms)
    }
}

/// Run `op` until it succeeds or the retry budget is spent
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_if(policy, label, op, |_| true).await
}

/// Like `retry_with_backoff`, but gives up at once on errors `should_retry` rejects
pub async fn retry_with_backoff_if<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && should_retry(&e) => {
                let delay = policy.delay_for(attempt);
                warn!("{} failed (attempt {}): {}, retrying in {:?}", label, attempt + 1, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_500_000, 6), "1.500000");
        assert_eq!(format_amount(1_120_877_955_333_353_905_234_925, 18), "1120877.955333");
        assert_eq!(format_amount(42, 0), "42");
    }

    #[test]
    fn test_delay_grows_with_attempts() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        let first = policy.delay_for(0);
        let third = policy.delay_for(2);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, String> = retry_with_backoff(policy, "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("boom".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<(), String> = retry_with_backoff_if(
            policy,
            "reverted",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("execution reverted".to_string()) }
            },
            |e| !e.contains("reverted"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<(), String> = retry_with_backoff(policy, "broken", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
