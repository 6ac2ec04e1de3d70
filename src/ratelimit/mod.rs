//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod client;
mod clock;
mod limiter;
mod rules;
mod store;

pub use backend::RateLimiterBackend;
pub use bucket::{Bucket, RefillRate};
pub use client::{ClientKey, FORWARDED_FOR};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{
    Decision, LimiterSettings, RateLimiter, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_TOKENS,
    DEFAULT_WINDOW_MS,
};
pub use rules::{RouteRule, RouteRules};
pub use store::BucketStore;
