use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Outbound request pacing for a broker client
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 180, // Alpaca allows 200/min per key
        }
    }
}

/// Shared limiter, cloned into every request path of one client
pub type RequestLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new rate limiter. A zero rate is clamped to one request per minute.
pub fn create_rate_limiter(config: RateLimiterConfig) -> RequestLimiter {
    let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

/// Wait until the limiter grants a permit
pub async fn throttle(limiter: &RequestLimiter) {
    if limiter.check().is_err() {
        tracing::debug!("Request rate limit reached, waiting for a permit");
        limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(RateLimiterConfig {
            requests_per_minute: 50,
        });
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let limiter = create_rate_limiter(RateLimiterConfig {
            requests_per_minute: 0,
        });
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_default_config() {
        assert_eq!(RateLimiterConfig::default().requests_per_minute, 180);
    }

    #[tokio::test]
    async fn test_throttle_passes_within_quota() {
        let limiter = create_rate_limiter(RateLimiterConfig::default());
        throttle(&limiter).await;
        throttle(&limiter).await;
    }
}
