//! Unified Responses dialect ⇄ OpenAI Chat Completions transforms.
//!
//! The Responses dialect uses `input` items instead of `messages` and
//! returns an `output` array instead of `choices`. Structured input items
//! of type `input_text` / `input_image_url` are renamed to their chat
//! equivalents; unknown item types pass through unchanged with a logged
//! warning, never silently dropped.

use relay_core::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, GatewayError, MessageContent, MessageRole,
    ResponseFormat,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Inbound unified Responses request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    /// Requested model id
    pub model: String,
    /// Input items, string-or-structured content
    pub input: Vec<InputItem>,
    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Frequency penalty
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    /// Presence penalty
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    /// Tool definitions, passed through untouched
    #[serde(default)]
    pub tools: Option<Value>,
    /// Structured output configuration
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    /// Streaming flag
    #[serde(default)]
    pub stream: bool,
    /// Explicit provider selection, gateway extension
    #[serde(default)]
    pub provider: Option<String>,
}

/// One input item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputItem {
    /// Message role
    pub role: String,
    /// String or structured content array
    pub content: Value,
}

/// Transform a unified Responses request into the internal OpenAI-shaped
/// representation.
///
/// # Errors
/// Fails on empty input, unknown roles, or content that is neither a
/// string nor an array.
pub fn responses_request_to_chat(req: ResponsesRequest) -> Result<ChatRequest, GatewayError> {
    if req.input.is_empty() {
        return Err(GatewayError::validation(
            "input cannot be empty",
            Some("input".to_string()),
            "empty_input",
        ));
    }

    let mut messages = Vec::with_capacity(req.input.len());
    for item in req.input {
        let role = MessageRole::parse(&item.role)?;
        messages.push(ChatMessage {
            role,
            content: convert_input_content(item.content)?,
            name: None,
            tool_calls: None,
            tool_call_id: None,
        });
    }

    let mut chat = ChatRequest::new(req.model, messages);
    chat.provider = req.provider;
    chat.max_tokens = req.max_tokens;
    chat.temperature = req.temperature;
    chat.top_p = req.top_p;
    chat.frequency_penalty = req.frequency_penalty;
    chat.presence_penalty = req.presence_penalty;
    chat.tools = req.tools;
    chat.response_format = req.response_format;
    chat.stream = req.stream;
    Ok(chat)
}

fn convert_input_content(content: Value) -> Result<MessageContent, GatewayError> {
    match content {
        Value::String(text) => Ok(MessageContent::Text(text)),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item.get("type").and_then(Value::as_str) {
                    Some("input_text") => {
                        let text = item.get("text").and_then(Value::as_str).unwrap_or_default();
                        parts.push(json!({"type": "text", "text": text}));
                    }
                    Some("input_image_url") => {
                        let image_url = item.get("image_url").cloned().unwrap_or_else(|| json!({}));
                        parts.push(json!({"type": "image_url", "image_url": image_url}));
                    }
                    Some("text" | "image_url") => parts.push(item),
                    other => {
                        warn!(item_type = ?other, "unknown input content type, passing through");
                        parts.push(item);
                    }
                }
            }
            Ok(MessageContent::Parts(parts))
        }
        other => Err(GatewayError::validation(
            format!("invalid input content type: {other}"),
            Some("content".to_string()),
            "invalid_content",
        )),
    }
}

/// Transform an internal chat response into the Responses shape
/// (`choices` → `output`).
#[must_use]
pub fn chat_response_to_responses(response: &ChatResponse) -> Value {
    let output: Vec<Value> = response
        .choices
        .iter()
        .map(|choice| {
            let mut item = json!({
                "index": choice.index,
                "finish_reason": choice.finish_reason,
                "role": choice.message.role,
                "content": choice.message.content.clone().unwrap_or_default(),
            });
            if let Some(tool_calls) = &choice.message.tool_calls {
                item["tool_calls"] = tool_calls.clone();
            }
            item
        })
        .collect();

    json!({
        "id": response.id,
        "object": "response",
        "created": response.created,
        "model": response.model,
        "output": output,
        "usage": response.usage,
    })
}

/// Transform one streamed chat chunk into the Responses chunk shape
/// (`choices[].delta` → `output[]`, object `response.chunk`).
#[must_use]
pub fn chat_chunk_to_response_chunk(chunk: &ChatChunk) -> Value {
    let output: Vec<Value> = chunk
        .choices
        .iter()
        .map(|choice| {
            let mut item = json!({"index": choice.index});
            if let Some(role) = choice.delta.role {
                item["role"] = json!(role);
            }
            if let Some(content) = &choice.delta.content {
                item["content"] = json!(content);
            }
            if let Some(reason) = choice.finish_reason {
                item["finish_reason"] = json!(reason);
            }
            item
        })
        .collect();

    json!({
        "id": chunk.id,
        "object": "response.chunk",
        "created": chunk.created,
        "model": chunk.model,
        "output": output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::FinishReason;

    fn request(input: Vec<InputItem>) -> ResponsesRequest {
        ResponsesRequest {
            model: "gpt-4o".to_string(),
            input,
            max_tokens: Some(100),
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            tools: None,
            response_format: None,
            stream: false,
            provider: None,
        }
    }

    #[test]
    fn test_string_input() {
        let chat = responses_request_to_chat(request(vec![InputItem {
            role: "user".to_string(),
            content: Value::String("Hello".to_string()),
        }]))
        .unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].content.as_text(), Some("Hello"));
    }

    #[test]
    fn test_input_text_renamed() {
        let chat = responses_request_to_chat(request(vec![InputItem {
            role: "user".to_string(),
            content: json!([
                {"type": "input_text", "text": "describe"},
                {"type": "input_image_url", "image_url": {"url": "https://example.com/x.png"}},
            ]),
        }]))
        .unwrap();
        let MessageContent::Parts(parts) = &chat.messages[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "https://example.com/x.png");
    }

    #[test]
    fn test_unknown_item_passes_through() {
        let chat = responses_request_to_chat(request(vec![InputItem {
            role: "user".to_string(),
            content: json!([{"type": "input_audio", "data": "zzz"}]),
        }]))
        .unwrap();
        let MessageContent::Parts(parts) = &chat.messages[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts[0]["type"], "input_audio");
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(responses_request_to_chat(request(vec![])).is_err());
    }

    #[test]
    fn test_response_output_shape() {
        let resp = ChatResponse::single("chatcmpl-5", "gpt-4o", "All good");
        let out = chat_response_to_responses(&resp);
        assert_eq!(out["object"], "response");
        assert_eq!(out["output"][0]["content"], "All good");
        assert_eq!(out["output"][0]["role"], "assistant");
    }

    #[test]
    fn test_chunk_transform() {
        let chunk = ChatChunk::delta("id-1", "gpt-4o", "par");
        let out = chat_chunk_to_response_chunk(&chunk);
        assert_eq!(out["object"], "response.chunk");
        assert_eq!(out["output"][0]["content"], "par");

        let done = ChatChunk::finish("id-1", "gpt-4o", FinishReason::Stop);
        let out = chat_chunk_to_response_chunk(&done);
        assert_eq!(out["output"][0]["finish_reason"], "stop");
    }
}
