//! # Relay Core
//!
//! Core types, traits, and error handling for the Model Relay Gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Request, response and streaming chunk types
//! - The `ProviderAdapter` capability trait
//! - Error types (`GatewayError`) and the normalized `ClassifiedError`
//! - The immutable per-request `RequestContext` and the `UsageRecord`
//!   accounting tuple

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;

// Re-export commonly used types
pub use context::{Dialect, EnvironmentTag, RequestContext, UsageRecord};
pub use error::{ClassifiedError, GatewayError, GatewayResult};
pub use provider::{ChunkStream, ProviderAdapter};
pub use request::{ChatMessage, ChatRequest, MessageContent, MessageRole, ResponseFormat};
pub use response::{
    approx_token_count, AssistantMessage, ChatResponse, Choice, FinishReason, TokenUsage,
};
pub use streaming::{ChatChunk, ChunkChoice, ChunkDelta};
