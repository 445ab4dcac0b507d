//! # Relay Limits
//!
//! Per-API-key rate limiting for the Model Relay Gateway.
//!
//! Admission control combines three mechanisms, checked in order:
//! concurrency cap, burst bucket (token bucket), and sliding windows
//! (requests and tokens per minute/hour/day). Checks are all-or-nothing
//! per key: on denial no counter moves.
//!
//! State lives behind the [`RateLimitStore`] trait with two
//! implementations selected by configuration: an in-process store for
//! single-instance deployments and a Redis-backed store for fleets. The
//! [`RateLimiter`] facade owns per-key configuration caching, the
//! fail-open policy, and the concurrency release guard.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod limiter;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use config::{RateLimitConfig, RateLimitTier};
pub use limiter::{
    Admission, ConcurrencyGuard, RateLimitConfigSource, RateLimiter, StaticConfigSource,
};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{Decision, Denial, DenyReason, RateLimitStore};
