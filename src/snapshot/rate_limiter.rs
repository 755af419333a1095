// =============================================================================
// Provider Rate Limiter — token bucket shared across all snapshot callers
// =============================================================================
//
// One bucket per external data provider. Grounded on the atomic-counter
// style of the exchange rate-limit tracker, but a snapshot caller must be
// able to *wait* for a token rather than just observe whether one is
// available, so the counters live behind a `parking_lot::Mutex` instead of
// bare atomics.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default sustained rate per provider.
pub const DEFAULT_RPS: f64 = 10.0;
/// Default burst capacity per provider.
pub const DEFAULT_BURST: f64 = 5.0;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterSnapshot {
    pub provider: String,
    pub tokens_available: f64,
    pub capacity: f64,
    pub rps: f64,
}

/// Token-bucket rate limiter for one provider. `acquire` suspends the
/// caller until a token is available rather than returning a busy signal —
/// per spec, "when the bucket is empty the caller suspends until a token
/// is available".
pub struct RateLimiter {
    provider: String,
    capacity: f64,
    rps: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(provider: impl Into<String>, rps: f64, burst: f64) -> Self {
        Self {
            provider: provider.into(),
            capacity: burst,
            rps,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn default_for(provider: impl Into<String>) -> Self {
        Self::new(provider, DEFAULT_RPS, DEFAULT_BURST)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.rps))
                }
            };
            match wait {
                None => return,
                Some(d) => {
                    debug!(provider = %self.provider, wait_ms = d.as_millis() as u64, "rate limiter bucket empty, suspending");
                    tokio::time::sleep(d.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        RateLimiterSnapshot {
            provider: self.provider.clone(),
            tokens_available: bucket.tokens,
            capacity: self.capacity,
            rps: self.rps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_capacity_is_immediately_available() {
        let limiter = RateLimiter::new("test", 10.0, 3.0);
        // Three tokens should be available without any wait.
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exhausted_bucket_forces_a_wait() {
        let limiter = RateLimiter::new("test", 100.0, 1.0);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        // At 100 rps, the next token costs ~10ms.
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
