//! Request types for the gateway.
//!
//! `ChatRequest` is the internal OpenAI-shaped representation every inbound
//! dialect is transformed into before dispatch. Adapters receive the same
//! type with the model id already rewritten for the target provider.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Internal chat request, OpenAI Chat Completions shaped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Requested model id as declared by the caller
    pub model: String,

    /// Conversation messages
    pub messages: Vec<ChatMessage>,

    /// Explicit provider selection; resolver input, never serialized upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Enable streaming response
    #[serde(default)]
    pub stream: bool,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Frequency penalty (-2.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty (-2.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Tool definitions, passed through to the upstream untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,

    /// Tool selection strategy, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,

    /// Response format ("text" / "json_object" / "json_schema")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// End-user identifier for abuse tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatRequest {
    /// Create a minimal request
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            provider: None,
            stream: false,
            max_tokens: None,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            tools: None,
            tool_choice: None,
            response_format: None,
            user: None,
        }
    }

    /// Replace the model id, keeping everything else
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Validate the request before dispatch
    ///
    /// # Errors
    /// Returns a validation error when a field is out of range or the
    /// message list is empty.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::validation(
                "model is required",
                Some("model".to_string()),
                "missing_model",
            ));
        }

        if self.messages.is_empty() {
            return Err(GatewayError::validation(
                "messages cannot be empty",
                Some("messages".to_string()),
                "empty_messages",
            ));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(GatewayError::validation(
                    format!("temperature must be between 0.0 and 2.0, got {t}"),
                    Some("temperature".to_string()),
                    "invalid_temperature",
                ));
            }
        }

        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(GatewayError::validation(
                    format!("top_p must be between 0.0 and 1.0, got {p}"),
                    Some("top_p".to_string()),
                    "invalid_top_p",
                ));
            }
        }

        for (name, value) in [
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ] {
            if let Some(v) = value {
                if !(-2.0..=2.0).contains(&v) {
                    return Err(GatewayError::validation(
                        format!("{name} must be between -2.0 and 2.0, got {v}"),
                        Some(name.to_string()),
                        format!("invalid_{name}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Content of the message
    pub content: MessageContent,

    /// Optional author name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls made by the assistant, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,

    /// Tool call id for tool response messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Plain text of the message, flattening multimodal parts
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content.flatten_text()
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction
    System,
    /// End-user turn
    User,
    /// Model turn
    Assistant,
    /// Tool response turn
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

impl MessageRole {
    /// Parse a role string from a foreign dialect
    ///
    /// # Errors
    /// Returns a validation error for roles no dialect defines.
    pub fn parse(role: &str) -> Result<Self, GatewayError> {
        match role {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(GatewayError::validation(
                format!("unknown message role: {other}"),
                Some("role".to_string()),
                "unknown_role",
            )),
        }
    }
}

/// Message content: plain text or multimodal parts.
///
/// Parts are kept as raw JSON values so unknown part types survive the
/// relay unchanged; the transform layer only rewrites the part shapes it
/// knows about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Multimodal content parts (OpenAI `type`-tagged objects)
    Parts(Vec<serde_json::Value>),
}

impl MessageContent {
    /// Get as text if this is plain text content
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Parts(_) => None,
        }
    }

    /// Flatten to plain text, joining text parts and skipping the rest
    #[must_use]
    pub fn flatten_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| {
                    (p.get("type").and_then(serde_json::Value::as_str) == Some("text"))
                        .then(|| p.get("text").and_then(serde_json::Value::as_str))
                        .flatten()
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Approximate character count used for token estimation
    #[must_use]
    pub fn char_count(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(serde_json::Value::as_str))
                .map(str::len)
                .sum(),
        }
    }

    /// Check if content is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// Response format configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Format type: "text", "json_object" or "json_schema"
    #[serde(rename = "type")]
    pub format_type: String,

    /// Schema payload when `format_type` is "json_schema"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_ok() {
        let req = ChatRequest::new("gpt-4o", vec![ChatMessage::user("Hello")]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_messages() {
        let req = ChatRequest::new("gpt-4o", vec![]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_temperature_range() {
        let mut req = ChatRequest::new("gpt-4o", vec![ChatMessage::user("Hello")]);
        req.temperature = Some(3.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(MessageRole::parse("user").unwrap(), MessageRole::User);
        assert!(MessageRole::parse("narrator").is_err());
    }

    #[test]
    fn test_content_flatten_text() {
        let content = MessageContent::Parts(vec![
            json!({"type": "text", "text": "Hello"}),
            json!({"type": "image_url", "image_url": {"url": "https://example.com/a.png"}}),
            json!({"type": "text", "text": "world"}),
        ]);
        assert_eq!(content.flatten_text(), "Hello world");
    }

    #[test]
    fn test_content_untagged_serialization() {
        let text = MessageContent::Text("Hi".to_string());
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"Hi\"");

        let parts: MessageContent =
            serde_json::from_value(json!([{"type": "text", "text": "Hi"}])).unwrap();
        assert!(matches!(parts, MessageContent::Parts(_)));
    }
}
