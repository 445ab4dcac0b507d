//! SSE stream assembly and per-stream accounting.
//!
//! A `StreamSession` accumulates delta content and token counters while
//! chunks flow to the caller. Finalization fires exactly once per stream:
//! on normal exhaustion, on upstream error, or — via the drop guard —
//! when the caller disconnects mid-stream. Token usage comes from the
//! provider when sent in-band, otherwise from the character-count
//! heuristic over whatever was accumulated.

use crate::dispatch::FinalizeEnv;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use relay_core::{approx_token_count, ChatChunk, ChunkStream, TokenUsage};
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, error, info, warn};

/// Accumulator for one active SSE stream
#[derive(Debug, Default)]
pub struct StreamSession {
    /// Concatenated delta content
    pub content: String,
    /// Concatenated `<thinking>` spans, when detected
    pub thinking: String,
    /// Usage reported in-band by the provider, if any
    pub usage: Option<TokenUsage>,
    /// Last finish reason seen
    pub finish_reason: Option<String>,
    /// Number of chunks relayed
    pub chunks: u32,
}

impl StreamSession {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulator
    pub fn absorb(&mut self, chunk: &ChatChunk) {
        self.chunks += 1;
        if let Some(content) = chunk.first_content() {
            self.content.push_str(content);
            if content.contains("<thinking>") || self.thinking_open() {
                self.thinking.push_str(content);
            }
        }
        if let Some(usage) = chunk.usage {
            if !usage.is_empty() {
                self.usage = Some(usage);
            }
        }
        if let Some(reason) = chunk.choices.first().and_then(|c| c.finish_reason) {
            self.finish_reason = Some(reason.to_string());
        }
    }

    fn thinking_open(&self) -> bool {
        !self.thinking.is_empty() && !self.thinking.contains("</thinking>")
    }

    /// Real usage when the provider sent it, else the character-count
    /// approximation over what was accumulated. Returns the usage and
    /// whether it was estimated.
    #[must_use]
    pub fn usage_or_estimate(&self, prompt_tokens_estimate: u32) -> (TokenUsage, bool) {
        match self.usage {
            Some(usage) => (usage, false),
            None => (
                TokenUsage::new(
                    prompt_tokens_estimate,
                    approx_token_count(self.content.len()),
                ),
                true,
            ),
        }
    }
}

/// Finalizes a stream exactly once.
///
/// Normal completion and upstream errors call [`StreamGuard::complete`]
/// inline; a caller disconnect drops the generator, and `Drop` spawns the
/// same finalization with the tokens accumulated so far. The `Option`
/// dance guarantees one of the two paths runs, never both.
struct StreamGuard {
    env: Option<FinalizeEnv>,
    session: StreamSession,
}

impl StreamGuard {
    fn new(env: FinalizeEnv) -> Self {
        Self {
            env: Some(env),
            session: StreamSession::new(),
        }
    }

    async fn complete(&mut self, finish_reason: &str) {
        let Some(env) = self.env.take() else { return };
        let (usage, estimated) = self.session.usage_or_estimate(env.estimated_prompt_tokens());
        let content = std::mem::take(&mut self.session.content);
        env.finalize(usage, &content, finish_reason, estimated).await;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let Some(env) = self.env.take() else { return };

        // Caller disconnected mid-stream: best-effort accounting with the
        // accumulated partial output, off the dying task.
        let session = std::mem::take(&mut self.session);
        warn!(
            request_id = %env.ctx.request_id,
            chunks = session.chunks,
            "Stream dropped by caller, finalizing in background"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let (usage, estimated) =
                    session.usage_or_estimate(env.estimated_prompt_tokens());
                env.finalize(usage, &session.content, "disconnect", estimated)
                    .await;
            });
        }
    }
}

/// Assemble the SSE response for a streaming dispatch.
///
/// `frame` maps each chunk to the dialect-specific wire value (identity
/// for the chat dialect, `response.chunk` for the responses dialect).
/// Frames are `data: <json>`; the terminal frame is literally
/// `data: [DONE]`; mid-stream errors are sent as an error frame before
/// the terminal frame.
pub fn sse_response<F>(upstream: ChunkStream, env: FinalizeEnv, frame: F) -> Response
where
    F: Fn(&ChatChunk) -> serde_json::Value + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut guard = StreamGuard::new(env);
        let mut upstream = upstream;
        let mut failed = false;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) => {
                    guard.session.absorb(&chunk);
                    let data = frame(&chunk).to_string();
                    yield Ok::<_, Infallible>(Event::default().data(data));
                }
                Err(e) => {
                    error!(error = %e, "Upstream stream error");
                    let error_frame = json!({
                        "error": {
                            "message": "Streaming error occurred",
                            "type": "stream_error",
                        }
                    });
                    yield Ok(Event::default().data(error_frame.to_string()));
                    failed = true;
                    break;
                }
            }
        }

        debug!(chunks = guard.session.chunks, "Upstream stream finished");

        // Post-stream plan check: the content already went out, so a
        // violation surfaces as an error frame while accounting still runs.
        if !failed {
            if let Some(env) = guard.env.as_ref() {
                let plan = env
                    .state
                    .entitlement
                    .check_plan_limits(
                        &env.ctx.user_id,
                        u64::from(guard.session.usage_or_estimate(env.estimated_prompt_tokens()).0.total_tokens),
                        env.ctx.environment,
                    )
                    .await;
                match plan {
                    Ok(decision) if !decision.allowed => {
                        let reason = decision.reason.unwrap_or_else(|| "unknown".to_string());
                        let error_frame = json!({
                            "error": {
                                "message": format!("Plan limit exceeded: {reason}"),
                                "type": "plan_limit_exceeded",
                            }
                        });
                        yield Ok(Event::default().data(error_frame.to_string()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Plan limit check failed, allowing"),
                }
            }
        }

        yield Ok(Event::default().data("[DONE]"));

        let finish_reason = if failed {
            "error".to_string()
        } else {
            guard
                .session
                .finish_reason
                .clone()
                .unwrap_or_else(|| "stop".to_string())
        };
        info!(chunks = guard.session.chunks, finish_reason = %finish_reason, "Stream complete");
        guard.complete(&finish_reason).await;
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::FinishReason;

    #[test]
    fn test_absorb_accumulates_content() {
        let mut session = StreamSession::new();
        session.absorb(&ChatChunk::delta("id", "m", "Hello "));
        session.absorb(&ChatChunk::delta("id", "m", "world"));
        session.absorb(&ChatChunk::finish("id", "m", FinishReason::Stop));
        assert_eq!(session.content, "Hello world");
        assert_eq!(session.chunks, 3);
        assert_eq!(session.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_in_band_usage_wins() {
        let mut session = StreamSession::new();
        let mut chunk = ChatChunk::delta("id", "m", "hi");
        chunk.usage = Some(TokenUsage::new(100, 50));
        session.absorb(&chunk);
        let (usage, estimated) = session.usage_or_estimate(7);
        assert!(!estimated);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_estimation_from_accumulated_content() {
        let mut session = StreamSession::new();
        session.absorb(&ChatChunk::delta("id", "m", "x".repeat(40)));
        let (usage, estimated) = session.usage_or_estimate(5);
        assert!(estimated);
        assert_eq!(usage.prompt_tokens, 5);
        assert_eq!(usage.completion_tokens, 10);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_thinking_span_detection() {
        let mut session = StreamSession::new();
        session.absorb(&ChatChunk::delta("id", "m", "<thinking>hm"));
        session.absorb(&ChatChunk::delta("id", "m", " more</thinking>"));
        session.absorb(&ChatChunk::delta("id", "m", "answer"));
        assert!(session.thinking.contains("hm more"));
        assert!(!session.thinking.contains("answer"));
    }
}
