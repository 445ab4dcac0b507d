//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

/// Extract the bearer API key from the Authorization header
#[derive(Debug, Clone)]
pub struct BearerKey(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;

        let api_key = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::unauthorized("Invalid Authorization format. Expected: Bearer <token>")
        })?;

        if api_key.is_empty() {
            return Err(ApiError::unauthorized("Empty API key"));
        }

        Ok(Self(api_key.to_string()))
    }
}

/// Extract the request ID from headers or generate one
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-request-id")
            .or_else(|| parts.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Ok(Self(id))
    }
}

/// Chat-session query parameters shared by the dialect endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionQuery {
    /// Chat session to splice history from and save messages to
    pub session_id: Option<i64>,
}

/// JSON body extractor with a clean 400 on malformed input
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        let value: T = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(error = %e, "JSON parse error");
            ApiError::bad_request(format!("Invalid JSON: {e}"))
        })?;

        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/test");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).expect("valid request").into_parts();
        parts
    }

    #[tokio::test]
    async fn test_bearer_key_extraction() {
        let mut parts = parts_with(&[("authorization", "Bearer sk-test-123")]);
        let key = BearerKey::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(key.0, "sk-test-123");
    }

    #[tokio::test]
    async fn test_missing_authorization_rejected() {
        let mut parts = parts_with(&[]);
        let result = BearerKey::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_bearer_rejected() {
        let mut parts = parts_with(&[("authorization", "Basic abc")]);
        assert!(BearerKey::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[tokio::test]
    async fn test_request_id_passthrough_and_generation() {
        let mut parts = parts_with(&[("x-request-id", "req-42")]);
        let id = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(id.0, "req-42");

        let mut parts = parts_with(&[]);
        let id = RequestId::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(!id.0.is_empty());
    }
}
