//! Client-side rate limiting and retry policy seams.
//!
//! Requests consult the client's [`RateLimiter`] before dispatch and its
//! [`Retry`] policy after a failed attempt. The built-in implementations
//! are pass-throughs; production limiters (token bucket, adaptive) plug in
//! behind the same traits.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::Error;
use crate::transport::BoxFuture;

/// Admission control applied before each request is dispatched.
pub trait RateLimiter: Send + Sync {
    /// Take a token without waiting; `false` means over the limit.
    fn try_acquire(&self) -> bool;

    /// Wait until a token is available.
    ///
    /// An error aborts the request before it reaches the transport.
    fn wait(&self) -> BoxFuture<'_, Result<(), Error>>;

    /// Steady-state tokens per second this limiter admits.
    fn qps(&self) -> f32;
}

/// Limiter that admits every request immediately.
pub struct NoLimit;

impl RateLimiter for NoLimit {
    fn try_acquire(&self) -> bool {
        true
    }

    fn wait(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    fn qps(&self) -> f32 {
        f32::INFINITY
    }
}

/// Token-bucket limiter: `burst` tokens up front, refilled at `qps`
/// tokens per second.
///
/// Built by [`Client::for_config`](crate::Client::for_config) from the
/// config's qps/burst hints when no explicit limiter is installed.
pub struct TokenBucket {
    qps: f32,
    burst: usize,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A limiter admitting `qps` requests per second with bursts of up to
    /// `burst` (at least one token is always allowed to accumulate).
    pub fn new(qps: f32, burst: usize) -> Self {
        let burst = burst.max(1);
        Self {
            qps: qps.max(f32::MIN_POSITIVE),
            burst,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last: Instant::now(),
            }),
        }
    }

    // Take a token if one is available; otherwise report how long until
    // the next one accrues.
    fn acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let accrued = now.duration_since(state.last).as_secs_f64() * f64::from(self.qps);
        state.tokens = (state.tokens + accrued).min(self.burst as f64);
        state.last = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        Err(Duration::from_secs_f64(
            (1.0 - state.tokens) / f64::from(self.qps),
        ))
    }
}

impl RateLimiter for TokenBucket {
    fn try_acquire(&self) -> bool {
        self.acquire().is_ok()
    }

    fn wait(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            loop {
                match self.acquire() {
                    Ok(()) => return Ok(()),
                    Err(until_next) => tokio::time::sleep(until_next).await,
                }
            }
        })
    }

    fn qps(&self) -> f32 {
        self.qps
    }
}

/// Decides whether a failed attempt is retried.
pub trait Retry: Send + Sync {
    /// Whether to resubmit after `attempt` failures (1-based), the latest
    /// of which was `err`.
    fn should_retry(&self, attempt: usize, err: &Error) -> bool;
}

/// Policy that never retries.
pub struct NoRetry;

impl Retry for NoRetry {
    fn should_retry(&self, _attempt: usize, _err: &Error) -> bool {
        false
    }
}

/// Retry retryable errors up to a fixed number of extra attempts.
pub struct RetryOnTransportError {
    max_retries: usize,
}

impl RetryOnTransportError {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }
}

impl Retry for RetryOnTransportError {
    fn should_retry(&self, attempt: usize, err: &Error) -> bool {
        attempt <= self.max_retries && err.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_limit_admits_immediately() {
        let limiter = NoLimit;
        assert!(limiter.try_acquire());
        limiter.wait().await.unwrap();
        assert!(limiter.qps().is_infinite());
    }

    #[test]
    fn test_token_bucket_admits_burst_then_denies() {
        let bucket = TokenBucket::new(0.001, 2);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        // burst spent and refill is far away
        assert!(!bucket.try_acquire());
        assert_eq!(bucket.qps(), 0.001);
    }

    #[tokio::test]
    async fn test_token_bucket_wait_admits_after_refill() {
        let bucket = TokenBucket::new(1000.0, 1);
        bucket.wait().await.unwrap();
        // the second token accrues within a millisecond at 1000 qps
        bucket.wait().await.unwrap();
    }

    #[test]
    fn test_token_bucket_burst_floor_is_one() {
        let bucket = TokenBucket::new(10.0, 0);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_retry_on_transport_error_respects_budget() {
        let policy = RetryOnTransportError::new(2);
        let err = Error::Transport("connection reset".into());
        assert!(policy.should_retry(1, &err));
        assert!(policy.should_retry(2, &err));
        assert!(!policy.should_retry(3, &err));
    }

    #[test]
    fn test_retry_skips_non_retryable_errors() {
        let policy = RetryOnTransportError::new(5);
        let err = Error::Decode("bad json".into());
        assert!(!policy.should_retry(1, &err));
        assert!(!NoRetry.should_retry(1, &Error::Timeout(Duration::from_secs(1))));
    }
}
