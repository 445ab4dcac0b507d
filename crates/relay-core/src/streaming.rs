//! Streaming chunk types for SSE responses.

use crate::request::MessageRole;
use crate::response::{FinishReason, TokenUsage};
use serde::{Deserialize, Serialize};

/// One streamed chunk, OpenAI `chat.completion.chunk` shaped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Response identifier, stable across chunks of one stream
    pub id: String,

    /// Object type, always "chat.completion.chunk"
    #[serde(default = "ChatChunk::object_name")]
    pub object: String,

    /// Unix timestamp of creation
    pub created: i64,

    /// Model producing the stream
    pub model: String,

    /// Delta choices
    pub choices: Vec<ChunkChoice>,

    /// Some providers report usage in the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ChatChunk {
    fn object_name() -> String {
        "chat.completion.chunk".to_string()
    }

    /// Create a content-delta chunk
    #[must_use]
    pub fn delta(id: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: Self::object_name(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(content.into()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// Create a terminal chunk carrying the finish reason
    #[must_use]
    pub fn finish(id: impl Into<String>, model: impl Into<String>, reason: FinishReason) -> Self {
        Self {
            id: id.into(),
            object: Self::object_name(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: None,
                    tool_calls: None,
                },
                finish_reason: Some(reason),
            }],
            usage: None,
        }
    }

    /// Content delta of the first choice, if any
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

/// One delta choice in a chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Incremental message delta
    pub delta: ChunkDelta,
    /// Present only in the terminal chunk of a choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, sent once in the first chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Content fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental tool call data, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_chunk() {
        let chunk = ChatChunk::delta("id-1", "gpt-4o", "Hel");
        assert_eq!(chunk.first_content(), Some("Hel"));
        assert_eq!(chunk.object, "chat.completion.chunk");
    }

    #[test]
    fn test_finish_chunk_roundtrip() {
        let chunk = ChatChunk::finish("id-1", "gpt-4o", FinishReason::Stop);
        let json = serde_json::to_string(&chunk).unwrap();
        let parsed: ChatChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.choices[0].finish_reason, Some(FinishReason::Stop));
        assert!(parsed.first_content().is_none());
    }
}
