//! Per-request context and accounting types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment a key operates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentTag {
    /// Production traffic
    #[default]
    Live,
    /// Test keys
    Test,
    /// Staging traffic
    Staging,
    /// Local development
    Development,
}

impl std::fmt::Display for EnvironmentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Test => write!(f, "test"),
            Self::Staging => write!(f, "staging"),
            Self::Development => write!(f, "development"),
        }
    }
}

/// Request dialect accepted at the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// OpenAI `/v1/chat/completions`
    Chat,
    /// Unified `/v1/responses`
    Responses,
    /// Anthropic `/v1/messages`
    Messages,
}

impl Dialect {
    /// Endpoint path for logging
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Chat => "/v1/chat/completions",
            Self::Responses => "/v1/responses",
            Self::Messages => "/v1/messages",
        }
    }
}

/// Immutable per-call value created once at request entry and passed by
/// reference through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for logs
    pub request_id: String,
    /// Raw API key of the caller
    pub api_key: String,
    /// Resolved user id
    pub user_id: String,
    /// Environment the key operates in
    pub environment: EnvironmentTag,
    /// Whether the key is on a free trial
    pub is_trial: bool,
    /// Model id as declared by the caller
    pub model: String,
    /// Provider explicitly declared by the caller, if any
    pub declared_provider: Option<String>,
    /// Inbound dialect
    pub dialect: Dialect,
    /// Whether the caller asked for a stream
    pub streaming: bool,
}

impl RequestContext {
    /// Masked key suitable for logs
    #[must_use]
    pub fn masked_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

/// Mask an API key for logging, keeping only the last four characters
#[must_use]
pub fn mask_key(key: &str) -> String {
    if key.len() >= 4 {
        format!("...{}", &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Finalized accounting tuple, produced exactly once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens generated
    pub completion_tokens: u32,
    /// Total tokens billed
    pub total_tokens: u32,
    /// Wall-clock latency of the upstream call
    #[serde(with = "humantime_serde_shim")]
    pub latency: Duration,
    /// Computed cost in USD
    pub cost: f64,
    /// Provider that actually served the request
    pub provider: String,
    /// Model id actually sent upstream
    pub model: String,
    /// Whether the response was streamed
    pub streamed: bool,
    /// Whether token counts were estimated rather than provider-reported
    pub estimated: bool,
}

mod humantime_serde_shim {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdef1234"), "...1234");
        assert_eq!(mask_key("abc"), "****");
    }

    #[test]
    fn test_environment_serde() {
        let env: EnvironmentTag = serde_json::from_str("\"staging\"").unwrap();
        assert_eq!(env, EnvironmentTag::Staging);
        assert_eq!(env.to_string(), "staging");
    }

    #[test]
    fn test_usage_record_roundtrip() {
        let record = UsageRecord {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
            latency: Duration::from_millis(1500),
            cost: 0.0021,
            provider: "openrouter".to_string(),
            model: "gpt-4o".to_string(),
            streamed: true,
            estimated: false,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: UsageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.latency, Duration::from_millis(1500));
        assert_eq!(parsed.total_tokens, 30);
    }
}
