//! End-to-end dispatch tests with in-process mock adapters.
//!
//! The registry, limiter, and collaborators are all injected fakes, so
//! these exercise admission, failover, classification and accounting
//! without any network.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use parking_lot::Mutex;
use relay_core::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChunkStream, Dialect, GatewayError,
    ProviderAdapter, TokenUsage,
};
use relay_integrations::{Billing, MemoryBilling};
use relay_limits::{MemoryStore, RateLimitConfig, RateLimiter};
use relay_providers::ProviderRegistry;
use relay_server::{admit, dispatch, AppState, DispatchOutcome};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// One scripted outcome for a mock adapter call
enum Scripted {
    Reply(&'static str),
    ReplyWithUsage(&'static str, u32, u32),
    Fail(fn() -> GatewayError),
    /// Chunks to yield, then an optional mid-stream error
    Stream(Vec<&'static str>, bool),
}

struct MockAdapter {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
}

impl MockAdapter {
    fn new(name: &str, script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Scripted {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Scripted::Reply("default"))
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        match self.next_script() {
            Scripted::Reply(content) => Ok(ChatResponse::single("resp-1", &request.model, content)),
            Scripted::ReplyWithUsage(content, prompt, completion) => {
                let mut response = ChatResponse::single("resp-1", &request.model, content);
                response.usage = TokenUsage::new(prompt, completion);
                Ok(response)
            }
            Scripted::Fail(make_error) => Err(make_error()),
            Scripted::Stream(..) => Err(GatewayError::internal("scripted a stream for send()")),
        }
    }

    async fn send_stream(&self, request: &ChatRequest) -> Result<ChunkStream, GatewayError> {
        match self.next_script() {
            Scripted::Stream(chunks, error_after) => {
                let model = request.model.clone();
                let mut items: Vec<Result<ChatChunk, GatewayError>> = chunks
                    .into_iter()
                    .map(|c| Ok(ChatChunk::delta("stream-1", &model, c)))
                    .collect();
                if error_after {
                    items.push(Err(GatewayError::streaming("connection reset")));
                }
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Scripted::Fail(make_error) => Err(make_error()),
            _ => Err(GatewayError::internal("scripted a reply for send_stream()")),
        }
    }
}

struct Harness {
    state: AppState,
    billing: Arc<MemoryBilling>,
}

fn harness(adapters: Vec<Arc<MockAdapter>>) -> Harness {
    let registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(adapter).unwrap();
    }
    let billing = Arc::new(MemoryBilling::new());
    let state = AppState::builder()
        .providers(Arc::new(registry))
        .billing(Arc::clone(&billing) as Arc<dyn Billing>)
        .build();
    Harness { state, billing }
}

async fn run_chat(
    harness: &Harness,
    request: ChatRequest,
) -> Result<DispatchOutcome, relay_server::ApiError> {
    let admitted = admit(
        &harness.state,
        "req-test".to_string(),
        "sk-test".to_string(),
        &request,
        Dialect::Chat,
    )
    .await?;
    dispatch(&harness.state, admitted, request, None).await
}

fn chat_request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user("What is the capital of France?")])
}

// Scenario 1: anthropic-style id, no explicit provider, resolver routes
// to the provider serving Anthropic models.
#[tokio::test]
async fn test_anthropic_model_routes_to_openrouter() {
    let openrouter = MockAdapter::new("openrouter", vec![Scripted::Reply("Paris.")]);
    let h = harness(vec![Arc::clone(&openrouter)]);

    let outcome = run_chat(&h, chat_request("claude-sonnet-4-5-20250929"))
        .await
        .expect("dispatch succeeds");

    let DispatchOutcome::Buffered(response) = outcome else {
        panic!("expected buffered response");
    };
    assert_eq!(openrouter.calls(), 1);
    assert!(!response.first_text().unwrap().is_empty());
    assert_eq!(response.object, "chat.completion");
}

// Scenario 2: first provider fails authentication, classified retryable,
// chain advances and the caller sees success.
#[tokio::test]
async fn test_auth_failure_fails_over() {
    let first = MockAdapter::new(
        "huggingface",
        vec![Scripted::Fail(|| GatewayError::authentication("bad key"))],
    );
    let second = MockAdapter::new("featherless", vec![Scripted::Reply("recovered")]);
    let h = harness(vec![Arc::clone(&first), Arc::clone(&second)]);

    let mut request = chat_request("some/model");
    request.provider = Some("huggingface".to_string());

    let outcome = run_chat(&h, request).await.expect("failover succeeds");
    let DispatchOutcome::Buffered(response) = outcome else {
        panic!("expected buffered response");
    };
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    assert_eq!(response.first_text(), Some("recovered"));
}

// Scenario 3: upstream 400 is non-retryable; the chain does not advance.
#[tokio::test]
async fn test_bad_request_does_not_fail_over() {
    let first = MockAdapter::new(
        "huggingface",
        vec![Scripted::Fail(|| {
            GatewayError::provider("huggingface", "invalid request", Some(400), false)
        })],
    );
    let second = MockAdapter::new("featherless", vec![Scripted::Reply("never")]);
    let h = harness(vec![Arc::clone(&first), Arc::clone(&second)]);

    let mut request = chat_request("some/model");
    request.provider = Some("huggingface".to_string());

    let error = run_chat(&h, request).await.expect_err("must fail");
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0, "non-retryable errors never fail over");
}

// The caller sees the LAST provider's classified error when the chain
// is exhausted.
#[tokio::test]
async fn test_exhausted_chain_surfaces_last_error() {
    // Non-eligible provider: singleton chain, one timeout, surfaced as 504
    let only = MockAdapter::new(
        "private-endpoint",
        vec![Scripted::Fail(|| {
            GatewayError::timeout(std::time::Duration::from_secs(60))
        })],
    );
    let h = harness(vec![Arc::clone(&only)]);

    let mut request = chat_request("some-model");
    request.provider = Some("private-endpoint".to_string());

    let error = run_chat(&h, request).await.expect_err("must fail");
    assert_eq!(error.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(only.calls(), 1);
}

// Buffered success performs the accounting sequence exactly once.
#[tokio::test]
async fn test_buffered_accounting_runs_once() {
    let openrouter = MockAdapter::new(
        "openrouter",
        vec![Scripted::ReplyWithUsage("Paris.", 12, 3)],
    );
    let h = harness(vec![openrouter]);

    run_chat(&h, chat_request("gpt-4o")).await.expect("success");

    assert_eq!(h.billing.usage_count(), 1);
    let usage = h.billing.usage.lock();
    assert_eq!(usage[0].total_tokens, 15);
    assert!(!usage[0].estimated);
    let deductions = h.billing.deductions.lock();
    assert_eq!(deductions.len(), 1);
    assert!(deductions[0].1 > 0.0);
}

// Scenario: a stream that errors after 2 of 5 chunks still triggers
// exactly one accounting finalize, with tokens estimated from the two
// received chunks.
#[tokio::test]
async fn test_stream_error_finalizes_exactly_once() {
    let openrouter = MockAdapter::new(
        "openrouter",
        vec![Scripted::Stream(vec!["Hello, ", "world"], true)],
    );
    let h = harness(vec![openrouter]);

    let mut request = chat_request("gpt-4o");
    request.stream = true;

    let outcome = run_chat(&h, request).await.expect("stream starts");
    let DispatchOutcome::Streaming { upstream, env } = outcome else {
        panic!("expected streaming outcome");
    };

    let response =
        relay_server::sse_response(upstream, env, |c| serde_json::to_value(c).unwrap_or_default());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body drains");
    let text = String::from_utf8_lossy(&body);

    assert!(text.contains("Hello, "));
    assert!(text.contains("stream_error"));
    assert!(text.contains("data: [DONE]"));

    // Accounting fired exactly once, with estimated usage
    assert_eq!(h.billing.usage_count(), 1);
    let usage = h.billing.usage.lock();
    assert!(usage[0].estimated);
    assert!(usage[0].streamed);
    // "Hello, world" is 12 chars, ~3 tokens of completion
    assert_eq!(usage[0].completion_tokens, 3);
}

// A clean stream finalizes once with the terminal [DONE] frame last.
#[tokio::test]
async fn test_stream_completes_and_finalizes() {
    let openrouter = MockAdapter::new(
        "openrouter",
        vec![Scripted::Stream(vec!["a", "b", "c"], false)],
    );
    let h = harness(vec![openrouter]);

    let mut request = chat_request("gpt-4o");
    request.stream = true;

    let DispatchOutcome::Streaming { upstream, env } =
        run_chat(&h, request).await.expect("stream starts")
    else {
        panic!("expected streaming outcome");
    };

    let response =
        relay_server::sse_response(upstream, env, |c| serde_json::to_value(c).unwrap_or_default());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body drains");
    let text = String::from_utf8_lossy(&body);

    assert!(text.trim_end().ends_with("data: [DONE]"));
    assert_eq!(h.billing.usage_count(), 1);
}

// A caller disconnect (dropping the stream mid-flight) still finalizes
// via the drop guard.
#[tokio::test]
async fn test_disconnect_still_finalizes() {
    let openrouter = MockAdapter::new(
        "openrouter",
        vec![Scripted::Stream(vec!["one", "two", "three"], false)],
    );
    let h = harness(vec![openrouter]);

    let mut request = chat_request("gpt-4o");
    request.stream = true;

    let DispatchOutcome::Streaming { upstream, env } =
        run_chat(&h, request).await.expect("stream starts")
    else {
        panic!("expected streaming outcome");
    };

    {
        let response = relay_server::sse_response(upstream, env, |c| {
            serde_json::to_value(c).unwrap_or_default()
        });
        let mut body = response.into_body().into_data_stream();
        // Read one frame, then hang up
        let _ = body.next().await;
    }

    // The drop guard spawns finalization; let it run
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.billing.usage_count(), 1);
}

// Scenario 4: a key at its requests-per-minute limit gets a 429 with a
// Retry-After header no later than the window.
#[tokio::test]
async fn test_rate_limited_key_gets_retry_after() {
    let openrouter = MockAdapter::new(
        "openrouter",
        vec![Scripted::Reply("one"), Scripted::Reply("two")],
    );
    let registry = ProviderRegistry::new();
    registry.register(openrouter).unwrap();

    let mut limits = RateLimitConfig::default();
    limits.requests_per_minute = 1;
    limits.burst_limit = 100;
    let limiter = Arc::new(RateLimiter::with_static_config(
        Arc::new(MemoryStore::new()),
        limits,
    ));

    let state = AppState::builder()
        .providers(Arc::new(registry))
        .limiter(limiter)
        .build();
    let app = relay_server::create_router(state);

    let request = |_: usize| {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("authorization", "Bearer sk-limited")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "model": "gpt-4o",
                    "messages": [{"role": "user", "content": "hi"}],
                })
                .to_string(),
            ))
            .unwrap()
    };

    let first = app.clone().oneshot(request(0)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(request(1)).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = second
        .headers()
        .get("retry-after")
        .expect("Retry-After present")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after <= 60);
}

// Missing max_tokens on /v1/messages fails closed with 400.
#[tokio::test]
async fn test_messages_requires_max_tokens() {
    let state = AppState::builder().build();
    let app = relay_server::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("authorization", "Bearer sk-test")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "model": "claude-sonnet-4-5-20250929",
                        "messages": [{"role": "user", "content": "hi"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
