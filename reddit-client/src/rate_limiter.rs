use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // Reddit allows 100 requests per minute for OAuth2
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every request the client makes.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst_allowance.max(1) as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Waits until a request may be sent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
            };

            debug!("Rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    pub async fn available_tokens(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens as u32
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_with_burst_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig::reddit_oauth());
        assert_eq!(limiter.available_tokens().await, 10);
    }

    #[tokio::test]
    async fn test_acquire_consumes_tokens() {
        let limiter = RateLimiter::new(RateLimitConfig::reddit_oauth());
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(limiter.available_tokens().await <= 7);
    }

    #[tokio::test]
    async fn test_acquire_waits_when_empty() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 20,
            time_window: Duration::from_secs(1),
            burst_allowance: 1,
        });

        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        // One token refills every 50ms.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
