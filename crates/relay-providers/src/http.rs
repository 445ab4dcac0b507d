//! OpenAI-compatible HTTP provider adapter.
//!
//! One implementation covers every provider in the fleet: they all accept
//! `POST {base_url}/chat/completions` with bearer auth and stream SSE
//! frames in the OpenAI chunk shape. Provider-specific behavior lives
//! entirely in configuration (endpoint, credentials, time budget).

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use relay_core::{
    ChatChunk, ChatRequest, ChatResponse, ChunkStream, GatewayError, ProviderAdapter,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Configuration for one HTTP provider endpoint
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Provider name as used in failover chains
    pub name: String,
    /// OpenAI-compatible base URL, no trailing slash
    pub base_url: String,
    /// Bearer credential; `None` means the provider is registered but
    /// unusable, and every call fails with a configuration error the
    /// classifier maps to "provider unavailable"
    pub api_key: Option<SecretString>,
    /// Request time budget
    pub timeout: Duration,
}

impl HttpProviderConfig {
    /// Create a configuration
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Set the time budget
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI-compatible HTTP adapter
pub struct HttpProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpProvider {
    /// Create an adapter from configuration
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(config: HttpProviderConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn api_key(&self) -> Result<&SecretString, GatewayError> {
        self.config.api_key.as_ref().ok_or_else(|| {
            GatewayError::configuration(format!(
                "no API key configured for provider {}",
                self.config.name
            ))
        })
    }

    fn map_transport_error(&self, e: &reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::timeout(self.config.timeout)
        } else if e.is_connect() {
            GatewayError::connection(&self.config.name, e.to_string())
        } else {
            GatewayError::provider(&self.config.name, e.to_string(), None, true)
        }
    }

    /// Map a non-2xx upstream response to a `GatewayError`
    fn parse_error(&self, status: u16, retry_after: Option<u64>, body: &str) -> GatewayError {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .map_or_else(|_| format!("HTTP {status}"), |b| b.error.message);

        match status {
            401 | 403 => GatewayError::authentication(message),
            404 => GatewayError::model_not_found(message),
            429 => GatewayError::rate_limited(message, retry_after),
            400..=499 => GatewayError::provider(&self.config.name, message, Some(status), false),
            _ => GatewayError::provider(&self.config.name, message, Some(status), true),
        }
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Strip gateway-internal fields before the request goes upstream
fn upstream_body(request: &ChatRequest, stream: bool) -> serde_json::Value {
    let mut body = serde_json::to_value(request).unwrap_or_default();
    if let Some(map) = body.as_object_mut() {
        map.remove("provider");
        map.insert("stream".to_string(), serde_json::Value::Bool(stream));
    }
    body
}

#[async_trait]
impl ProviderAdapter for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        let api_key = self.api_key()?;
        let url = self.endpoint();

        debug!(
            provider = %self.config.name,
            model = %request.model,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&upstream_body(request, false))
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.config.name, error = %e, "Upstream request failed");
                self.map_transport_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), retry_after, &body));
        }

        let body = response.text().await.map_err(|e| {
            GatewayError::provider(
                &self.config.name,
                format!("failed to read response: {e}"),
                None,
                false,
            )
        })?;

        trace!(provider = %self.config.name, body = %body, "Upstream response");

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::provider(
                &self.config.name,
                format!("invalid response JSON: {e}"),
                None,
                false,
            )
        })
    }

    async fn send_stream(&self, request: &ChatRequest) -> Result<ChunkStream, GatewayError> {
        let api_key = self.api_key()?;
        let url = self.endpoint();
        let provider = self.config.name.clone();

        debug!(
            provider = %provider,
            model = %request.model,
            "Sending streaming chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&upstream_body(request, true))
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), retry_after, &body));
        }

        let stream = try_stream! {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = chunk_result.map_err(|e| {
                    GatewayError::streaming(format!("{provider} stream error: {e}"))
                })?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete SSE events
                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer = buffer[pos + 2..].to_string();

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data.trim() == "[DONE]" {
                            return;
                        }
                        match serde_json::from_str::<ChatChunk>(data) {
                            Ok(chunk) => yield chunk,
                            Err(e) => {
                                // Tolerate foreign frames; skip, never abort
                                trace!(provider = %provider, error = %e, "skipping unparseable frame");
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
