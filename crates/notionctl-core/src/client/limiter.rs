//! Process-wide token bucket
//!
//! Every request attempt, retries included, takes one token. The bucket is
//! shared by reference between all clients built from the same profile.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{ApiError, ApiResult};

/// Notion's documented average is three requests per second
pub const DEFAULT_RATE_PER_SECOND: f64 = 3.0;
pub const DEFAULT_BURST: u32 = 6;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with a fixed refill rate and burst capacity
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_second: f64,
    burst: f64,
    /// `None` means unlimited
    bucket: Option<Mutex<Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_PER_SECOND, DEFAULT_BURST)
    }
}

impl RateLimiter {
    /// Create a limiter that starts full
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate_per_second,
            burst,
            bucket: Some(Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            })),
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self {
            rate_per_second: f64::INFINITY,
            burst: f64::INFINITY,
            bucket: None,
        }
    }

    /// Reserve one token, returning how long the caller must wait before using it
    fn reserve(&self) -> Duration {
        let Some(bucket) = &self.bucket else {
            return Duration::ZERO;
        };
        let mut bucket = bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.rate_per_second).min(self.burst);
        bucket.last_refill = now;

        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate_per_second)
        }
    }

    /// Hand back a reservation that was never used
    fn cancel_reservation(&self) {
        if let Some(bucket) = &self.bucket {
            let mut bucket = bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
        }
    }

    /// Wait for a token
    ///
    /// Returns a cancellation error, and releases the reservation, if `cancel`
    /// fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> ApiResult<()> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled {
                during: "rate limit wait",
            });
        }

        let wait = self.reserve();
        if wait.is_zero() {
            return Ok(());
        }

        debug!("Rate limited locally, waiting {:?}", wait);
        tokio::select! {
            _ = cancel.cancelled() => {
                self.cancel_reservation();
                Err(ApiError::Cancelled { during: "rate limit wait" })
            }
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_immediate() {
        let limiter = RateLimiter::new(3.0, 6);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.acquire(&cancel).await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_refill_after_burst() {
        let limiter = RateLimiter::new(2.0, 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_wait() {
        let limiter = RateLimiter::new(0.001, 1);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let limiter = RateLimiter::unlimited();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(limiter.acquire(&cancel).await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let cancel = CancellationToken::new();
        for _ in 0..1000 {
            limiter.acquire(&cancel).await.unwrap();
        }
    }
}
