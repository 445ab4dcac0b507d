//! The rate limit store interface.
//!
//! The orchestrator's admission logic is store-agnostic: both the
//! in-process and the Redis-backed store implement this trait, and the
//! `RateLimiter` facade handles fail-open when a store errors.

use crate::config::RateLimitConfig;
use async_trait::async_trait;
use relay_core::GatewayError;
use serde::Serialize;

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Concurrency cap reached
    Concurrency,
    /// Burst bucket empty
    Burst,
    /// Requests-per-minute window full
    RequestsPerMinute,
    /// Tokens-per-minute window full
    TokensPerMinute,
    /// Requests-per-hour window full
    RequestsPerHour,
    /// Tokens-per-hour window full
    TokensPerHour,
    /// Requests-per-day window full
    RequestsPerDay,
    /// Tokens-per-day window full
    TokensPerDay,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Concurrency => "Concurrency limit exceeded",
            Self::Burst => "Burst limit exceeded",
            Self::RequestsPerMinute => "Minute request limit exceeded",
            Self::TokensPerMinute => "Minute token limit exceeded",
            Self::RequestsPerHour => "Hour request limit exceeded",
            Self::TokensPerHour => "Hour token limit exceeded",
            Self::RequestsPerDay => "Day request limit exceeded",
            Self::TokensPerDay => "Day token limit exceeded",
        };
        write!(f, "{text}")
    }
}

/// A denial with its soonest-reset hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Denial {
    /// Which check blocked the request
    pub reason: DenyReason,
    /// Seconds until the blocking window resets
    pub retry_after: u64,
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted; counters were updated and concurrency reserved
    Allowed,
    /// Request denied; no state changed
    Denied(Denial),
}

impl Decision {
    /// Whether the request was admitted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Backing store for rate limit state.
///
/// `check_and_reserve` is all-or-nothing per key: on success it appends
/// the request to every window, consumes a burst token and increments the
/// concurrency counter; on denial nothing moves.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Check all limits and reserve on success
    ///
    /// # Errors
    /// Returns an error only when the backing store is unreachable; the
    /// caller fails open.
    async fn check_and_reserve(
        &self,
        key: &str,
        config: &RateLimitConfig,
        estimated_tokens: u64,
    ) -> Result<Decision, GatewayError>;

    /// Decrement the in-flight concurrency counter, exactly once per
    /// admitted request
    async fn release(&self, key: &str);

    /// Reconcile the provisional token reservation with the real count
    /// once known
    ///
    /// # Errors
    /// Returns an error only when the backing store is unreachable.
    async fn finalize(
        &self,
        key: &str,
        config: &RateLimitConfig,
        reserved_tokens: u64,
        actual_tokens: u64,
    ) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_reason_display() {
        assert_eq!(DenyReason::Burst.to_string(), "Burst limit exceeded");
        assert_eq!(
            DenyReason::TokensPerDay.to_string(),
            "Day token limit exceeded"
        );
    }

    #[test]
    fn test_decision_is_allowed() {
        assert!(Decision::Allowed.is_allowed());
        assert!(!Decision::Denied(Denial {
            reason: DenyReason::Concurrency,
            retry_after: 60
        })
        .is_allowed());
    }
}
