//! Token bucket state and refill arithmetic.

use std::time::Duration;

/// Continuous refill rate: `tokens` credits every `per_ms` milliseconds.
///
/// Kept as a ratio rather than a float so that whole-token intervals
/// (e.g. 6000 ms at 10 per 60 s) refill exactly one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillRate {
    /// Tokens regenerated per window
    pub tokens: u32,
    /// Window length in milliseconds
    pub per_ms: u64,
}

impl RefillRate {
    /// Create a refill rate of `tokens` per `per_ms` milliseconds.
    pub fn new(tokens: u32, per_ms: u64) -> Self {
        Self { tokens, per_ms }
    }

    /// Tokens regenerated over `elapsed_ms`.
    pub fn tokens_for(&self, elapsed_ms: u64) -> f64 {
        if self.per_ms == 0 {
            return 0.0;
        }
        elapsed_ms as f64 * self.tokens as f64 / self.per_ms as f64
    }

    /// Time needed to regenerate `tokens`, rounded up to the millisecond.
    ///
    /// Returns `None` if the rate is zero.
    pub fn time_for(&self, tokens: f64) -> Option<Duration> {
        if self.tokens == 0 {
            return None;
        }
        let millis = (tokens * self.per_ms as f64 / self.tokens as f64).ceil();
        Some(Duration::from_millis(millis.max(0.0) as u64))
    }
}

/// Request credits for a single client key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Available credits, always within `[0, capacity]`
    pub tokens: f64,
    /// Milliseconds since the epoch of the last refill
    pub last_refill: u64,
}

impl Bucket {
    /// A full bucket observed at `now`.
    pub fn full(capacity: u32, now: u64) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Add the credits earned since the last refill, capped at `capacity`.
    ///
    /// `last_refill` never moves backwards: if the clock steps back, no
    /// time is considered elapsed and the later timestamp is kept.
    pub fn refill(&mut self, now: u64, capacity: u32, rate: RefillRate) {
        let elapsed = now.saturating_sub(self.last_refill);
        self.tokens = (self.tokens + rate.tokens_for(elapsed)).min(capacity as f64);
        self.last_refill = self.last_refill.max(now);
    }

    /// Take one credit if a whole one is available.
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole credits currently available.
    pub fn remaining(&self) -> u32 {
        self.tokens.max(0.0).floor() as u32
    }

    /// Time until a whole credit is available, or `None` if `capacity`
    /// can never hold one.
    pub fn time_until_token(&self, capacity: u32, rate: RefillRate) -> Option<Duration> {
        if capacity == 0 {
            return None;
        }
        if self.tokens >= 1.0 {
            return Some(Duration::ZERO);
        }
        rate.time_for(1.0 - self.tokens)
    }
}
