//! Error types for the gateway.
//!
//! Two layers of errors live here. `GatewayError` is the rich error raised
//! by adapters, stores and transforms. `ClassifiedError` is the normalized
//! `(status, retryable, retry_after)` value the error classifier derives
//! from a `GatewayError` so the orchestrator can branch on plain data when
//! deciding whether to fail over to the next provider.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request validation failed before reaching any provider
    #[error("validation error: {message}")]
    Validation {
        /// Human readable message
        message: String,
        /// Offending field, if known
        field: Option<String>,
        /// Stable machine-readable code
        code: String,
    },

    /// The upstream rejected our credentials
    #[error("authentication error: {message}")]
    Authentication {
        /// Human readable message
        message: String,
    },

    /// Local configuration problem (missing key, bad endpoint, ...)
    #[error("configuration error: {message}")]
    Configuration {
        /// Human readable message
        message: String,
    },

    /// Provider-reported error with optional HTTP status
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Human readable message
        message: String,
        /// Upstream HTTP status, if any
        status_code: Option<u16>,
        /// Whether another provider may succeed
        retryable: bool,
    },

    /// Upstream call exceeded its time budget
    #[error("timeout after {duration:?}")]
    Timeout {
        /// The budget that was exceeded
        duration: Duration,
    },

    /// Connection-level failure (DNS, refused, reset)
    #[error("connection error to {provider}: {message}")]
    Connection {
        /// Provider name
        provider: String,
        /// Human readable message
        message: String,
    },

    /// Upstream rate limit hit
    #[error("rate limited: {message}")]
    RateLimited {
        /// Human readable message
        message: String,
        /// Seconds until the caller may retry, if the provider said
        retry_after: Option<u64>,
    },

    /// Model not found or not served by the provider
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Human readable message
        message: String,
    },

    /// Error while consuming an upstream stream
    #[error("streaming error: {message}")]
    Streaming {
        /// Human readable message
        message: String,
    },

    /// Anything else
    #[error("internal error: {message}")]
    Internal {
        /// Human readable message
        message: String,
    },
}

impl GatewayError {
    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a connection error
    pub fn connection(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a rate-limited error
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Create a model-not-found error
    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::ModelNotFound {
            message: message.into(),
        }
    }

    /// Create a streaming error
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the same request may succeed on a different provider
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::RateLimited { .. }
            | Self::Authentication { .. }
            | Self::Configuration { .. }
            | Self::ModelNotFound { .. }
            | Self::Streaming { .. } => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Validation { .. } | Self::Internal { .. } => false,
        }
    }
}

/// Normalized error produced by the error classifier.
///
/// The orchestrator never branches on `GatewayError` variants when walking
/// the failover chain; it branches on this value instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    /// HTTP status surfaced to the caller if this attempt is the last one
    pub status: u16,
    /// Human readable detail
    pub detail: String,
    /// Seconds until retry, when the upstream provided one
    pub retry_after: Option<u64>,
    /// Whether the failover chain may advance past this error
    pub retryable: bool,
}

impl ClassifiedError {
    /// Create a classified error
    #[must_use]
    pub fn new(status: u16, detail: impl Into<String>, retryable: bool) -> Self {
        Self {
            status,
            detail: detail.into(),
            retry_after: None,
            retryable,
        }
    }

    /// Attach a retry-after hint
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(GatewayError::timeout(Duration::from_secs(30)).is_retryable());
        assert!(GatewayError::connection("openrouter", "refused").is_retryable());
        assert!(GatewayError::rate_limited("slow down", Some(5)).is_retryable());
        assert!(GatewayError::authentication("bad key").is_retryable());
        assert!(GatewayError::provider("together", "boom", Some(503), true).is_retryable());

        assert!(!GatewayError::validation("bad", None, "bad_request").is_retryable());
        assert!(!GatewayError::provider("together", "rejected", Some(400), false).is_retryable());
        assert!(!GatewayError::internal("oops").is_retryable());
    }

    #[test]
    fn test_classified_error_builder() {
        let err = ClassifiedError::new(429, "Upstream rate limit exceeded", true)
            .with_retry_after(30);
        assert_eq!(err.status, 429);
        assert_eq!(err.retry_after, Some(30));
        assert!(err.retryable);
    }
}
