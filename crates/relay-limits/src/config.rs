//! Per-key rate limit configuration and tier presets.

use serde::{Deserialize, Serialize};

/// Rate limit configuration for one API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per minute window
    pub requests_per_minute: u64,
    /// Requests allowed per hour window
    pub requests_per_hour: u64,
    /// Requests allowed per day window
    pub requests_per_day: u64,
    /// Tokens allowed per minute window
    pub tokens_per_minute: u64,
    /// Tokens allowed per hour window
    pub tokens_per_hour: u64,
    /// Tokens allowed per day window
    pub tokens_per_day: u64,
    /// Burst bucket capacity
    pub burst_limit: u64,
    /// Maximum concurrent in-flight requests
    pub concurrency_limit: u64,
    /// Sliding window size in seconds for the minute window and the burst
    /// refill interval
    pub window_size_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitTier::Default.config()
    }
}

/// Built-in limit tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitTier {
    /// Entry tier
    Default,
    /// Paid tier
    Premium,
    /// Contract tier
    Enterprise,
}

impl RateLimitTier {
    /// Limits for this tier
    #[must_use]
    pub fn config(self) -> RateLimitConfig {
        match self {
            Self::Default => RateLimitConfig {
                requests_per_minute: 60,
                requests_per_hour: 1_000,
                requests_per_day: 10_000,
                tokens_per_minute: 10_000,
                tokens_per_hour: 100_000,
                tokens_per_day: 1_000_000,
                burst_limit: 10,
                concurrency_limit: 5,
                window_size_seconds: 60,
            },
            Self::Premium => RateLimitConfig {
                requests_per_minute: 300,
                requests_per_hour: 5_000,
                requests_per_day: 50_000,
                tokens_per_minute: 50_000,
                tokens_per_hour: 500_000,
                tokens_per_day: 5_000_000,
                burst_limit: 50,
                concurrency_limit: 20,
                window_size_seconds: 60,
            },
            Self::Enterprise => RateLimitConfig {
                requests_per_minute: 1_000,
                requests_per_hour: 20_000,
                requests_per_day: 200_000,
                tokens_per_minute: 200_000,
                tokens_per_hour: 2_000_000,
                tokens_per_day: 20_000_000,
                burst_limit: 100,
                concurrency_limit: 50,
                window_size_seconds: 60,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tier() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.burst_limit, 10);
        assert_eq!(config.concurrency_limit, 5);
    }

    #[test]
    fn test_tiers_are_ordered() {
        let default = RateLimitTier::Default.config();
        let premium = RateLimitTier::Premium.config();
        let enterprise = RateLimitTier::Enterprise.config();
        assert!(default.requests_per_minute < premium.requests_per_minute);
        assert!(premium.requests_per_minute < enterprise.requests_per_minute);
    }
}
