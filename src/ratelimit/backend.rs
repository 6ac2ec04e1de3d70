//! Rate limiter trait for abstracting the admission check from its callers.

use super::limiter::{Decision, RateLimiter};

/// Trait for rate limiter implementations.
///
/// The gRPC service and the HTTP layer are generic over this trait so they
/// can be exercised against any admission policy.
pub trait RateLimiterBackend: Send + Sync {
    /// Admit or reject one request from `key`, optionally overriding the
    /// burst size for this call.
    fn check(&self, key: &str, limit: Option<u32>) -> Decision;
}

impl RateLimiterBackend for RateLimiter {
    fn check(&self, key: &str, limit: Option<u32>) -> Decision {
        RateLimiter::check(self, key, limit)
    }
}
