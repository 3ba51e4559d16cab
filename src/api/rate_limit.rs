//! Token-bucket rate limiting.
//!
//! One bucket per key. Tokens refill steadily at `rpm / 60` tokens/second
//! and the burst cap is `ceil(rpm / 2)` — enough to absorb short spikes
//! without allowing runaway bursts. Generalized over the bucket key so the
//! same implementation backs both the per-IP HTTP search limiter and the
//! per-socket WS subscribe limiter.
//!
//! When an HTTP request is rejected the response includes:
//! - `429 Too Many Requests`
//! - `Retry-After: <seconds>` — exact wait before the bucket has a token again
//! - `X-RateLimit-Limit: <rpm>` — configured limit
//! - `X-RateLimit-Policy: <N>;w=60` — standard hint: N requests per 60-second window

use std::{
    hash::Hash,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

/// Per-key token bucket state.
#[derive(Debug, Clone)]
struct Bucket {
    last_refill: Instant,
    tokens: f64,
}

/// Shared rate limiter: one token bucket per key.
pub struct RateLimiter<K = IpAddr>
where
    K: Eq + Hash + Clone,
{
    /// Configured limit in requests per minute.
    pub rpm: u32,
    fill_rate: f64,
    capacity: f64,
    buckets: DashMap<K, Bucket>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Create a new rate limiter for the given requests-per-minute limit.
    pub fn new(rpm: u32) -> Self {
        let capacity = ((rpm + 1) / 2) as f64; // ceil(rpm / 2)
        let fill_rate = rpm as f64 / 60.0;
        Self { rpm, fill_rate, capacity, buckets: DashMap::new() }
    }

    /// Attempt to consume one token for `key`.
    ///
    /// Returns `Ok(())` if the request is allowed, or `Err(retry_after_secs)`
    /// if the bucket is empty.
    pub fn check(&self, key: K) -> Result<(), f64> {
        let now = Instant::now();

        let mut bucket =
            self.buckets.entry(key).or_insert_with(|| Bucket { last_refill: now, tokens: self.capacity });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let new_tokens = (bucket.tokens + elapsed * self.fill_rate).min(self.capacity);

        if new_tokens < 1.0 {
            let retry_after = (1.0 - new_tokens) / self.fill_rate;
            return Err(retry_after.ceil());
        }

        bucket.last_refill = now;
        bucket.tokens = new_tokens - 1.0;
        Ok(())
    }

    /// Convenience boolean form of [`RateLimiter::check`] for callers (like
    /// the WS subscribe path) that don't surface `Retry-After`.
    pub fn allow(&self, key: &K) -> bool {
        self.check(key.clone()).is_ok()
    }
}

/// Axum middleware that enforces per-IP rate limits ahead of a handler.
///
/// No-ops (passes through) when `limiter` is `None`.
/// Falls back to `127.0.0.1` if `ConnectInfo` is unavailable (e.g., in tests).
pub async fn rate_limit_middleware(
    State(limiter): State<Option<Arc<RateLimiter<IpAddr>>>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = limiter {
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

        if let Err(retry_after) = limiter.check(ip) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    ("retry-after", retry_after.to_string()),
                    ("x-ratelimit-limit", limiter.rpm.to_string()),
                    ("x-ratelimit-policy", format!("{};w=60", limiter.rpm)),
                    ("content-type", "text/plain".into()),
                ],
                "Rate limit exceeded. Please retry after the indicated delay.",
            )
                .into_response();
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(a: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, a))
    }

    #[test]
    fn fresh_bucket_allows_up_to_capacity() {
        let limiter: RateLimiter<IpAddr> = RateLimiter::new(60); // capacity = 30
        let test_ip = ip(1);

        let allowed = (0..limiter.capacity as usize).filter(|_| limiter.check(test_ip).is_ok()).count();

        assert_eq!(allowed, limiter.capacity as usize);
    }

    #[test]
    fn exceeding_capacity_returns_retry_after() {
        let limiter: RateLimiter<IpAddr> = RateLimiter::new(60);
        let test_ip = ip(2);

        for _ in 0..limiter.capacity as usize {
            let _ = limiter.check(test_ip);
        }

        let result = limiter.check(test_ip);
        assert!(result.is_err());
        assert!(result.unwrap_err() >= 1.0);
    }

    #[test]
    fn different_keys_have_independent_buckets() {
        let limiter: RateLimiter<IpAddr> = RateLimiter::new(4); // capacity = 2
        let ip_a = ip(10);
        let ip_b = ip(11);

        let _ = limiter.check(ip_a);
        let _ = limiter.check(ip_a);

        assert!(limiter.check(ip_b).is_ok());
    }

    #[test]
    fn string_keyed_limiter_tracks_independent_sockets() {
        let limiter: RateLimiter<String> = RateLimiter::new(10); // capacity = 5
        for _ in 0..5 {
            assert!(limiter.allow(&"socket-a".to_string()));
        }
        assert!(!limiter.allow(&"socket-a".to_string()));
        assert!(limiter.allow(&"socket-b".to_string()));
    }
}
