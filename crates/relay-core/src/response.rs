//! Response types for the gateway.

use crate::request::MessageRole;
use serde::{Deserialize, Serialize};

/// Buffered chat completion response, OpenAI shaped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response identifier
    pub id: String,

    /// Object type, always "chat.completion"
    #[serde(default = "ChatResponse::object_name")]
    pub object: String,

    /// Unix timestamp of creation
    pub created: i64,

    /// Model that produced the response
    pub model: String,

    /// Completion choices
    pub choices: Vec<Choice>,

    /// Token usage as reported by the provider
    #[serde(default)]
    pub usage: TokenUsage,
}

impl ChatResponse {
    fn object_name() -> String {
        "chat.completion".to_string()
    }

    /// Create a response with a single assistant text choice
    #[must_use]
    pub fn single(id: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: Self::object_name(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: MessageRole::Assistant,
                    content: Some(content.into()),
                    tool_calls: None,
                },
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: TokenUsage::default(),
        }
    }

    /// Text of the first choice, if any
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// One completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// The generated message
    pub message: AssistantMessage,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Message generated by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Always `assistant` in practice
    pub role: MessageRole,
    /// Text content; absent when the model only called tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

/// Finish reason, OpenAI vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Hit the max_tokens budget
    Length,
    /// Content filter intervened
    ContentFilter,
    /// Model requested tool invocations
    ToolCalls,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::ToolCalls => write!(f, "tool_calls"),
        }
    }
}

/// Token usage counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of the two
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create usage from prompt/completion counts
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// True when the provider reported nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

/// Approximate token count from character length.
///
/// This is an explicit heuristic (roughly 4 characters per token for
/// English text), used only when a provider omits usage metadata. It is an
/// approximation, not a measurement.
#[must_use]
pub fn approx_token_count(chars: usize) -> u32 {
    ((chars / 4).max(1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_new() {
        let usage = TokenUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
        assert!(!usage.is_empty());
        assert!(TokenUsage::default().is_empty());
    }

    #[test]
    fn test_approx_token_count() {
        assert_eq!(approx_token_count(0), 1);
        assert_eq!(approx_token_count(3), 1);
        assert_eq!(approx_token_count(8), 2);
        assert_eq!(approx_token_count(400), 100);
    }

    #[test]
    fn test_finish_reason_serde() {
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolCalls).unwrap(),
            "\"tool_calls\""
        );
        let parsed: FinishReason = serde_json::from_str("\"length\"").unwrap();
        assert_eq!(parsed, FinishReason::Length);
    }

    #[test]
    fn test_single_response() {
        let resp = ChatResponse::single("chatcmpl-1", "gpt-4o", "Hi there");
        assert_eq!(resp.first_text(), Some("Hi there"));
        assert_eq!(resp.object, "chat.completion");
    }
}
