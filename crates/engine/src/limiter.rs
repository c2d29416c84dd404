//! Token-bucket pacing for fetcher requests.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Async token-bucket rate limiter.
///
/// Tokens refill continuously at `rate` per second up to `burst`; each
/// [`wait`](Self::wait) consumes one, sleeping when the bucket is empty.
/// A small random jitter is applied to spread wakeups of concurrent
/// callers. The limiter is advisory only: it delays requests, it never
/// rejects them.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    jitter_strength: f64,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    updated_at: Instant,
}

impl RateLimiter {
    pub fn new(rate: f64) -> Self {
        Self::with_burst(rate, 10)
    }

    pub fn with_burst(rate: f64, burst: u32) -> Self {
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            capacity: f64::from(burst.max(1)),
            jitter_strength: 0.3,
            state: Mutex::new(Bucket {
                tokens: f64::from(burst.max(1)),
                updated_at: Instant::now(),
            }),
        }
    }

    /// Disable jitter; pacing becomes deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_strength = 0.0;
        self
    }

    /// Take one token, sleeping until the bucket allows it.
    ///
    /// Holding the bucket lock across the sleep intentionally serializes
    /// waiters, so concurrent callers are released one interval apart.
    pub async fn wait(&self) {
        let mut bucket = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.updated_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.updated_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            let jitter = self.jitter();
            if jitter > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(jitter)).await;
            }
            return;
        }

        let wait = (1.0 - bucket.tokens) / self.rate;
        let total = (wait + self.jitter()).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(total)).await;
        bucket.updated_at = Instant::now();
        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    }

    fn jitter(&self) -> f64 {
        if self.jitter_strength <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(-self.jitter_strength..self.jitter_strength)
    }
}
