use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

/// Token-bucket rate limiter keyed by `(principal, namespace, name)`, used
/// to bound SSH certificate minting per workspace per caller. Idle buckets
/// are swept on access rather than by a background task, the same
/// explicit-init-explicit-teardown discipline the long-poll notifier uses.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, String, String), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the call is permitted, consuming one token.
    pub async fn try_acquire(&self, principal: &str, namespace: &str, name: &str) -> bool {
        let now = Instant::now();
        let capacity = (self.config.limit + self.config.burst) as f64;
        let refill_rate = self.config.limit as f64 / self.config.window.as_secs_f64();

        let mut buckets = self.buckets.lock().await;
        buckets.retain(|_, bucket| now.duration_since(bucket.last_used) < self.config.idle_bucket_ttl);

        let key = (principal.to_string(), namespace.to_string(), name.to_string());
        let bucket = buckets.entry(key).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
            last_used: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(capacity);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            limit: 2,
            window: Duration::from_secs(60),
            burst: 0,
            idle_bucket_ttl: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn permits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(config());
        assert!(limiter.try_acquire("p1", "ns", "ws").await);
        assert!(limiter.try_acquire("p1", "ns", "ws").await);
        assert!(!limiter.try_acquire("p1", "ns", "ws").await);
    }

    #[tokio::test]
    async fn distinct_keys_have_independent_buckets() {
        let limiter = RateLimiter::new(config());
        assert!(limiter.try_acquire("p1", "ns", "ws-a").await);
        assert!(limiter.try_acquire("p1", "ns", "ws-a").await);
        assert!(limiter.try_acquire("p1", "ns", "ws-b").await);
    }
}
