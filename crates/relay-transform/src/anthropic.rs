//! Anthropic Messages ⇄ OpenAI Chat Completions transforms.
//!
//! Inbound: the Anthropic dialect separates the system prompt from the
//! message list and requires `max_tokens`; both are folded into the
//! internal OpenAI-shaped request. `top_k` has no OpenAI equivalent; it is
//! logged and dropped. Outbound: `choices[0].message` becomes a typed
//! `content` block array, `finish_reason` maps onto `stop_reason`, and
//! usage counters are renamed.

use relay_core::{
    ChatMessage, ChatRequest, ChatResponse, FinishReason, GatewayError, MessageContent,
    MessageRole,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Inbound Anthropic Messages request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessagesRequest {
    /// Requested model id
    pub model: String,
    /// Conversation turns (user/assistant only)
    pub messages: Vec<AnthropicMessage>,
    /// System prompt, kept separate in this dialect
    #[serde(default)]
    pub system: Option<String>,
    /// Required in this dialect; validation fails closed when absent
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Anthropic-specific; recorded in logs and dropped
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Stop sequences, mapped onto OpenAI `stop`
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Streaming flag (not supported on this endpoint)
    #[serde(default)]
    pub stream: bool,
    /// Explicit provider selection, gateway extension
    #[serde(default)]
    pub provider: Option<String>,
}

/// One Anthropic message: string content or typed content blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// `user` or `assistant`
    pub role: String,
    /// String or content block array
    pub content: Value,
}

/// Transform an Anthropic Messages request into the internal
/// OpenAI-shaped representation.
///
/// # Errors
/// Fails closed on a missing `max_tokens`, an empty message list, or an
/// unknown role.
pub fn messages_request_to_chat(req: AnthropicMessagesRequest) -> Result<ChatRequest, GatewayError> {
    let max_tokens = req.max_tokens.ok_or_else(|| {
        GatewayError::validation(
            "max_tokens is required",
            Some("max_tokens".to_string()),
            "missing_max_tokens",
        )
    })?;

    if req.messages.is_empty() {
        return Err(GatewayError::validation(
            "messages cannot be empty",
            Some("messages".to_string()),
            "empty_messages",
        ));
    }

    if let Some(top_k) = req.top_k {
        // No OpenAI-compatible equivalent; recorded here and dropped.
        debug!(top_k, model = %req.model, "top_k has no equivalent downstream, dropping");
    }

    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = req.system.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }

    for msg in req.messages {
        let role = MessageRole::parse(&msg.role)?;
        if !matches!(role, MessageRole::User | MessageRole::Assistant) {
            return Err(GatewayError::validation(
                format!("role {role} is not valid in the messages dialect"),
                Some("role".to_string()),
                "invalid_role",
            ));
        }
        messages.push(ChatMessage {
            role,
            content: convert_content(msg.content)?,
            name: None,
            tool_calls: None,
            tool_call_id: None,
        });
    }

    let mut chat = ChatRequest::new(req.model, messages);
    chat.provider = req.provider;
    chat.max_tokens = Some(max_tokens);
    chat.temperature = req.temperature;
    chat.top_p = req.top_p;
    chat.stop = req.stop_sequences;
    chat.stream = req.stream;
    Ok(chat)
}

/// Convert Anthropic content (string or block array) to message content.
fn convert_content(content: Value) -> Result<MessageContent, GatewayError> {
    match content {
        Value::String(text) => Ok(MessageContent::Text(text)),
        Value::Array(blocks) => {
            let mut parts = Vec::with_capacity(blocks.len());
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                        parts.push(json!({"type": "text", "text": text}));
                    }
                    Some("image") => {
                        if let Some(part) = convert_image_block(&block) {
                            parts.push(part);
                        }
                    }
                    _ => {
                        // Unknown block types survive the relay unchanged
                        debug!(block = %block, "passing through unknown content block");
                        parts.push(block);
                    }
                }
            }
            // A single text block collapses to a plain string upstream
            if parts.len() == 1 {
                if let Some(text) = parts[0]
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|_| parts[0].get("type").and_then(Value::as_str) == Some("text"))
                {
                    return Ok(MessageContent::Text(text.to_string()));
                }
            }
            Ok(MessageContent::Parts(parts))
        }
        other => Err(GatewayError::validation(
            format!("invalid content type: {other}"),
            Some("content".to_string()),
            "invalid_content",
        )),
    }
}

fn convert_image_block(block: &Value) -> Option<Value> {
    let source = block.get("source")?;
    match source.get("type").and_then(Value::as_str) {
        Some("base64") => {
            let media_type = source
                .get("media_type")
                .and_then(Value::as_str)
                .unwrap_or("image/jpeg");
            let data = source.get("data").and_then(Value::as_str).unwrap_or_default();
            Some(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:{media_type};base64,{data}")}
            }))
        }
        Some("url") => {
            let url = source.get("url").and_then(Value::as_str).unwrap_or_default();
            Some(json!({"type": "image_url", "image_url": {"url": url}}))
        }
        _ => None,
    }
}

/// Transform an internal chat response into the Anthropic Messages shape.
#[must_use]
pub fn chat_response_to_messages(response: &ChatResponse, model: &str) -> Value {
    let choice = response.choices.first();
    let content = choice.and_then(|c| c.message.content.as_deref()).unwrap_or_default();
    let finish_reason = choice.and_then(|c| c.finish_reason);

    let stop_reason = match finish_reason {
        Some(FinishReason::Length) => "max_tokens",
        Some(FinishReason::ContentFilter) => "stop_sequence",
        Some(FinishReason::ToolCalls) => "tool_use",
        Some(FinishReason::Stop) | None => "end_turn",
    };

    let mut content_blocks: Vec<Value> = Vec::new();

    // tool_calls take priority and become tool_use blocks
    if let Some(tool_calls) = choice
        .and_then(|c| c.message.tool_calls.as_ref())
        .and_then(Value::as_array)
    {
        for call in tool_calls {
            let function = call.get("function").cloned().unwrap_or_default();
            let name = function.get("name").and_then(Value::as_str).unwrap_or("tool");
            let input = function
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or_else(|| json!({}));
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .map_or_else(|| format!("tool-{}", uuid::Uuid::new_v4()), String::from);
            content_blocks.push(json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }));
        }
    }

    if !content.trim().is_empty() {
        content_blocks.push(json!({"type": "text", "text": content}));
    }
    if content_blocks.is_empty() {
        content_blocks.push(json!({"type": "text", "text": ""}));
    }

    json!({
        "id": response.id,
        "type": "message",
        "role": "assistant",
        "content": content_blocks,
        "model": if response.model.is_empty() { model } else { &response.model },
        "stop_reason": stop_reason,
        "stop_sequence": Value::Null,
        "usage": {
            "input_tokens": response.usage.prompt_tokens,
            "output_tokens": response.usage.completion_tokens,
        },
    })
}
