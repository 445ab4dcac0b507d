//! The provider adapter capability trait.
//!
//! Every upstream provider is reached through exactly one implementation of
//! [`ProviderAdapter`]. The orchestrator looks adapters up from a registry
//! by name and never branches on the provider name anywhere else.

use crate::error::GatewayError;
use crate::request::ChatRequest;
use crate::response::ChatResponse;
use crate::streaming::ChatChunk;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Stream of chunks from an upstream provider
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, GatewayError>>;

/// Uniform capability every upstream provider implements: send chat
/// messages, get a response or a stream.
///
/// The `request.model` an adapter receives is already the
/// provider-specific id produced by the resolver.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name as used in failover chains and logs
    fn name(&self) -> &str;

    /// Per-provider request time budget
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Send a buffered chat completion request
    ///
    /// # Errors
    /// Returns a `GatewayError` that the error classifier normalizes.
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError>;

    /// Send a streaming chat completion request
    ///
    /// # Errors
    /// Returns a `GatewayError` for failures before the first byte; errors
    /// mid-stream surface as `Err` items of the returned stream.
    async fn send_stream(&self, request: &ChatRequest) -> Result<ChunkStream, GatewayError>;
}
