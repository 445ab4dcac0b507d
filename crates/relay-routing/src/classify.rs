//! Error classification.
//!
//! Maps the heterogeneous `GatewayError` values adapters raise into a
//! normalized `ClassifiedError` so the orchestrator branches on plain data
//! when deciding continue-vs-abort. Pure function: identical input always
//! yields an identical classification.
//!
//! Credential problems on our side map to 503 rather than 401: a missing
//! or misconfigured upstream key means "this provider is unavailable", not
//! "the caller is unauthorized", and the chain should advance instead of
//! surfacing a misleading auth rejection. Explicit SDK-level auth errors
//! keep their 401 status but remain retryable at the chain level, since
//! the next provider may hold valid credentials.

use relay_core::{ClassifiedError, GatewayError};

/// Classify an adapter error raised while calling `provider` for `model`.
#[must_use]
pub fn classify(provider: &str, model: &str, error: &GatewayError) -> ClassifiedError {
    match error {
        GatewayError::Authentication { .. } => {
            ClassifiedError::new(401, format!("{provider} authentication error"), true)
        }

        GatewayError::Configuration { .. } => ClassifiedError::new(
            503,
            format!("{provider} is unavailable (credentials not configured)"),
            true,
        ),

        GatewayError::Timeout { .. } => ClassifiedError::new(504, "Upstream timeout", true),

        GatewayError::Connection { .. } => {
            ClassifiedError::new(503, "Upstream service unavailable", true)
        }

        GatewayError::RateLimited { retry_after, .. } => {
            let classified = ClassifiedError::new(429, "Upstream rate limit exceeded", true);
            match retry_after {
                Some(seconds) => classified.with_retry_after(*seconds),
                None => classified,
            }
        }

        GatewayError::ModelNotFound { .. } => ClassifiedError::new(
            404,
            format!("Model {model} not found or unavailable on {provider}"),
            true,
        ),

        GatewayError::Validation { .. } => {
            // The same malformed request fails identically everywhere
            ClassifiedError::new(400, "Upstream rejected the request", false)
        }

        GatewayError::Provider {
            status_code,
            message,
            retryable,
            ..
        } => match status_code {
            Some(429) => ClassifiedError::new(429, "Upstream rate limit exceeded", true),
            Some(404) => ClassifiedError::new(
                404,
                format!("Model {model} not found or unavailable on {provider}"),
                true,
            ),
            Some(400..=499) => ClassifiedError::new(400, "Upstream rejected the request", false),
            Some(500..=599) => ClassifiedError::new(502, "Upstream service error", true),
            _ => ClassifiedError::new(502, message.clone(), *retryable),
        },

        GatewayError::Streaming { message } => ClassifiedError::new(502, message.clone(), true),

        GatewayError::Internal { message } => ClassifiedError::new(500, message.clone(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_authentication_maps_to_retryable_401() {
        let err = GatewayError::authentication("invalid key");
        let classified = classify("together", "m", &err);
        assert_eq!(classified.status, 401);
        assert!(classified.retryable);
    }

    #[test]
    fn test_missing_credentials_map_to_503() {
        let err = GatewayError::configuration("TOGETHER_API_KEY not set");
        let classified = classify("together", "m", &err);
        assert_eq!(classified.status, 503);
        assert!(classified.retryable);
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let err = GatewayError::timeout(Duration::from_secs(60));
        let classified = classify("together", "m", &err);
        assert_eq!(classified.status, 504);
        assert!(classified.retryable);
    }

    #[test]
    fn test_connection_maps_to_503() {
        let err = GatewayError::connection("together", "dns failure");
        assert_eq!(classify("together", "m", &err).status, 503);
    }

    #[test]
    fn test_rate_limit_propagates_retry_after() {
        let err = GatewayError::rate_limited("slow down", Some(30));
        let classified = classify("together", "m", &err);
        assert_eq!(classified.status, 429);
        assert_eq!(classified.retry_after, Some(30));
        assert!(classified.retryable);
    }

    #[test]
    fn test_not_found_is_retryable() {
        let err = GatewayError::model_not_found("no such model");
        let classified = classify("together", "llama-3", &err);
        assert_eq!(classified.status, 404);
        assert!(classified.retryable);
        assert!(classified.detail.contains("llama-3"));
        assert!(classified.detail.contains("together"));
    }

    #[test]
    fn test_bad_request_is_not_retryable() {
        let err = GatewayError::provider("together", "invalid request", Some(400), false);
        let classified = classify("together", "m", &err);
        assert_eq!(classified.status, 400);
        assert!(!classified.retryable);
    }

    #[test]
    fn test_unclassified_5xx_maps_to_502() {
        let err = GatewayError::provider("together", "boom", Some(500), true);
        let classified = classify("together", "m", &err);
        assert_eq!(classified.status, 502);
        assert!(classified.retryable);
    }

    #[test]
    fn test_classification_is_pure() {
        let err = GatewayError::provider("together", "boom", Some(503), true);
        let a = classify("together", "m", &err);
        let b = classify("together", "m", &err);
        assert_eq!(a, b);
    }
}
