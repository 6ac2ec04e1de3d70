//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::bucket::{Bucket, RefillRate};
use super::clock::{Clock, SystemClock};
use super::store::BucketStore;
use crate::error::{Result, TollgateError};

/// Default refill window.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default burst size.
pub const DEFAULT_MAX_TOKENS: u32 = 10;
/// Default number of client keys tracked at once.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Construction-time settings for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Time for an empty bucket to refill completely
    pub window_ms: u64,
    /// Burst size, also the refill amount per window
    pub max_tokens: u32,
    /// Maximum number of client keys tracked at once
    pub cache_capacity: usize,
    /// Idle time after which a client's bucket is forgotten
    pub cache_ttl_ms: u64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_tokens: DEFAULT_MAX_TOKENS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl LimiterSettings {
    /// Settings for `max_tokens` per `window_ms`, with the bucket TTL
    /// matching the window.
    pub fn new(max_tokens: u32, window_ms: u64) -> Self {
        Self {
            window_ms,
            max_tokens,
            cache_ttl_ms: window_ms,
            ..Self::default()
        }
    }

    /// Check that the settings describe a usable limiter.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TollgateError::InvalidSettings(
                "window_ms must be greater than 0".into(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(TollgateError::InvalidSettings(
                "max_tokens must be greater than 0".into(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(TollgateError::InvalidSettings(
                "cache_capacity must be greater than 0".into(),
            ));
        }
        if self.cache_ttl_ms == 0 {
            return Err(TollgateError::InvalidSettings(
                "cache_ttl_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The continuous refill rate, `max_tokens / window_ms`.
    pub fn refill_rate(&self) -> RefillRate {
        RefillRate::new(self.max_tokens, self.window_ms)
    }
}

/// The outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Burst size the check was evaluated against
    pub limit: u32,
    /// Whole tokens left after the check
    pub remaining: u32,
    /// On denial, time until a token is available. `None` when admitted
    /// or when the limit can never admit a request.
    pub retry_after: Option<Duration>,
}

/// Per-key token bucket admission control.
///
/// Each key gets a bucket of `max_tokens` credits that refills
/// continuously at `max_tokens` per window; every admitted request
/// costs one credit. Buckets live in a [`BucketStore`] bounded by
/// `cache_capacity` keys and expire after `cache_ttl_ms` of inactivity.
///
/// A check runs entirely under one lock, so concurrent checks for the
/// same key never admit more requests than the bucket holds.
pub struct RateLimiter {
    buckets: Mutex<BucketStore>,
    settings: LimiterSettings,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter with default settings and the system clock.
    pub fn new() -> Self {
        let settings = LimiterSettings::default();
        Self {
            buckets: Mutex::new(BucketStore::new(
                settings.cache_capacity,
                settings.cache_ttl_ms,
            )),
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a rate limiter with custom settings and the system clock.
    pub fn with_settings(settings: LimiterSettings) -> Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(settings: LimiterSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            buckets: Mutex::new(BucketStore::new(
                settings.cache_capacity,
                settings.cache_ttl_ms,
            )),
            settings,
            clock,
        })
    }

    /// Admit or reject one request from `key`.
    ///
    /// `limit` overrides the burst size for this call; `None` uses
    /// `max_tokens`. The refill rate always derives from `max_tokens`.
    pub fn check_limit(&self, key: &str, limit: Option<u32>) -> bool {
        self.check(key, limit).allowed
    }

    /// Admit or reject one request from `key`, reporting bucket state.
    pub fn check(&self, key: &str, limit: Option<u32>) -> Decision {
        let limit = limit.unwrap_or(self.settings.max_tokens);
        let rate = self.settings.refill_rate();

        let mut buckets = self.buckets.lock();
        let now = self.clock.now_millis();

        let mut bucket = match buckets.get(key, now) {
            Some(bucket) => bucket,
            None => {
                debug!(key = %key, limit = limit, "Creating new token bucket");
                Bucket::full(limit, now)
            }
        };

        bucket.refill(now, limit, rate);
        let allowed = bucket.try_consume();
        buckets.insert(key, bucket, now);
        drop(buckets);

        trace!(
            key = %key,
            limit = limit,
            tokens = bucket.tokens,
            allowed = allowed,
            "Checked rate limit"
        );

        let retry_after = if allowed {
            None
        } else {
            debug!(key = %key, limit = limit, "Rate limit exceeded");
            bucket.time_until_token(limit, rate)
        };

        Decision {
            allowed,
            limit,
            remaining: bucket.remaining(),
            retry_after,
        }
    }

    /// Drop every bucket idle for longer than the TTL.
    ///
    /// Returns the number of buckets removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        self.buckets.lock().purge_expired(now)
    }

    /// Number of buckets currently held.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Clear all buckets.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
