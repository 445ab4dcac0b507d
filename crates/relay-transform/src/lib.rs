//! # Relay Transform
//!
//! Pure, I/O-free transformations between the three request/response
//! dialects the gateway speaks:
//!
//! - OpenAI Chat Completions (the internal representation)
//! - Anthropic Messages
//! - the unified Responses dialect
//!
//! All transforms are total over well-formed input and reject with a
//! validation error on empty message arrays, unknown roles, or missing
//! required fields. Nothing here guesses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod responses;

pub use anthropic::{
    chat_response_to_messages, messages_request_to_chat, AnthropicMessage, AnthropicMessagesRequest,
};
pub use responses::{
    chat_chunk_to_response_chunk, chat_response_to_responses, responses_request_to_chat,
    InputItem, ResponsesRequest,
};
