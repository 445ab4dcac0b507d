//! API error responses.
//!
//! Renders as an OpenAI-style error body with the HTTP status of the
//! failure; a `Retry-After` header is attached when known, plus any
//! endpoint-specific headers (trial expiry hints and friends).

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{ClassifiedError, GatewayError};
use serde_json::json;

/// API error returned to the caller
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Human readable detail
    pub message: String,
    /// Machine readable error type
    pub error_type: String,
    /// Seconds until retry, rendered as `Retry-After`
    pub retry_after: Option<u64>,
    /// Extra response headers
    pub headers: Vec<(String, String)>,
}

impl ApiError {
    /// Create an error with an explicit status
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_type: error_type.into(),
            retry_after: None,
            headers: Vec::new(),
        }
    }

    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "invalid_request_error")
    }

    /// 401 Unauthorized
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "authentication_error")
    }

    /// 402 Payment Required
    #[must_use]
    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYMENT_REQUIRED, message, "insufficient_credits")
    }

    /// 403 Forbidden
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message, "permission_error")
    }

    /// 404 Not Found
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, "not_found_error")
    }

    /// 429 Too Many Requests
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message, "rate_limit_exceeded")
    }

    /// 503 Service Unavailable
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "service_unavailable")
    }

    /// 500 Internal Server Error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "internal_error")
    }

    /// Attach a `Retry-After` value
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Attach an extra header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build from a classified upstream error; the caller sees the last
    /// attempt's status and detail.
    #[must_use]
    pub fn from_classified(classified: ClassifiedError) -> Self {
        let status =
            StatusCode::from_u16(classified.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let error_type = match classified.status {
            400 => "invalid_request_error",
            401 | 403 => "authentication_error",
            404 => "not_found_error",
            429 => "rate_limit_exceeded",
            504 => "upstream_timeout",
            _ => "upstream_error",
        };
        let mut error = Self::new(status, classified.detail, error_type);
        error.retry_after = classified.retry_after;
        error
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Validation { message, .. } => Self::bad_request(message),
            GatewayError::Authentication { message } => Self::unauthorized(message),
            GatewayError::ModelNotFound { message } => Self::not_found(message),
            GatewayError::RateLimited {
                message,
                retry_after,
            } => {
                let mut e = Self::too_many_requests(message);
                e.retry_after = retry_after;
                e
            }
            GatewayError::Timeout { .. } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "Upstream timeout",
                "upstream_timeout",
            ),
            GatewayError::Connection { .. } | GatewayError::Configuration { .. } => {
                Self::service_unavailable("Upstream service unavailable")
            }
            GatewayError::Provider { message, .. } | GatewayError::Streaming { message } => {
                Self::new(StatusCode::BAD_GATEWAY, message, "upstream_error")
            }
            GatewayError::Internal { message } => Self::internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": self.error_type,
            }
        }));

        let mut response = (self.status, body).into_response();

        if let Some(seconds) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_header() {
        let error = ApiError::too_many_requests("Rate limit exceeded").with_retry_after(42);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "42");
    }

    #[test]
    fn test_from_classified_maps_status() {
        let error = ApiError::from_classified(ClassifiedError::new(504, "Upstream timeout", true));
        assert_eq!(error.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error.error_type, "upstream_timeout");
    }

    #[test]
    fn test_extra_headers() {
        let error = ApiError::forbidden("Trial expired")
            .with_header("X-Trial-Expired", "true");
        let response = error.into_response();
        assert_eq!(response.headers().get("x-trial-expired").unwrap(), "true");
    }
}
