//! The request orchestrator.
//!
//! Per request: `Admitted → RateLimited(precheck) → ChainBuilt →
//! Attempting(i) → {Succeeded | Exhausted}`. Admission happens before any
//! upstream call; the failover loop branches only on classified error
//! values; usage finalization runs exactly once per request on every
//! terminal path.

use crate::error::ApiError;
use crate::state::AppState;
use relay_core::{
    approx_token_count, ChatMessage, ChatRequest, ChatResponse, ChunkStream, ClassifiedError,
    Dialect, FinishReason, GatewayError, MessageContent, MessageRole, RequestContext, TokenUsage,
    UsageRecord,
};
use relay_integrations::{ActivityEntry, TrialStatus, UserAccount};
use relay_limits::{ConcurrencyGuard, RateLimiter};
use relay_routing::{build_failover_chain, classify, transform_model_id};
use serde_json::json;
use std::time::Instant;
use tracing::{error, info, warn};

/// Result of request admission
pub struct Admitted {
    /// Immutable per-call context
    pub ctx: RequestContext,
    /// Resolved account
    pub user: UserAccount,
    /// Trial status of the key
    pub trial: TrialStatus,
    /// Concurrency guard; `None` for trial keys, which are governed by
    /// trial quotas instead of the rate limiter
    pub guard: Option<ConcurrencyGuard>,
    /// Tokens provisionally reserved at admission (zero for the
    /// admission-only pre-check)
    pub reserved_tokens: u64,
}

/// Admit a request: resolve the user, validate trial access, check
/// credits, and pre-check the rate limit with zero tokens.
///
/// # Errors
/// Returns the appropriate 4xx before any upstream call is made.
pub async fn admit(
    state: &AppState,
    request_id: String,
    api_key: String,
    request: &ChatRequest,
    dialect: Dialect,
) -> Result<Admitted, ApiError> {
    let user = state
        .identity
        .get_user_by_key(&api_key)
        .await
        .map_err(|e| {
            error!(error = %e, "Identity lookup failed");
            ApiError::service_unavailable("Identity service unavailable")
        })?
        .ok_or_else(|| {
            warn!(request_id = %request_id, "Invalid API key");
            ApiError::unauthorized("Invalid API key")
        })?;

    let trial = state.trial.validate_access(&api_key).await.map_err(|e| {
        error!(error = %e, "Trial validation failed");
        ApiError::service_unavailable("Trial service unavailable")
    })?;

    if !trial.is_valid {
        return Err(trial_rejection(&trial));
    }

    if !trial.is_trial && user.credits <= 0.0 {
        return Err(ApiError::payment_required("Insufficient credits"));
    }

    // Admission-only pre-check: request count, zero tokens. Trial keys
    // are governed by trial quotas instead.
    let guard = if trial.is_trial {
        None
    } else {
        match RateLimiter::admit(&state.limiter, &api_key, 0).await {
            Ok(admission) => Some(admission.guard),
            Err(denial) => {
                return Err(ApiError::too_many_requests(format!(
                    "Rate limit exceeded: {}",
                    denial.reason
                ))
                .with_retry_after(denial.retry_after));
            }
        }
    };

    let ctx = RequestContext {
        request_id,
        api_key,
        user_id: user.id.clone(),
        environment: user.environment,
        is_trial: trial.is_trial,
        model: request.model.clone(),
        declared_provider: request.provider.clone(),
        dialect,
        streaming: request.stream,
    };

    info!(
        request_id = %ctx.request_id,
        key = %ctx.masked_key(),
        model = %ctx.model,
        dialect = %ctx.dialect.endpoint(),
        streaming = ctx.streaming,
        "Request admitted"
    );

    Ok(Admitted {
        ctx,
        user,
        trial,
        guard,
        reserved_tokens: 0,
    })
}

fn trial_rejection(trial: &TrialStatus) -> ApiError {
    let detail = trial
        .error
        .clone()
        .unwrap_or_else(|| "Access denied".to_string());

    if trial.is_trial && trial.is_expired {
        let mut err = ApiError::forbidden(detail).with_header("X-Trial-Expired", "true");
        if let Some(end) = &trial.trial_end_date {
            err = err.with_header("X-Trial-End-Date", end.clone());
        }
        err
    } else if trial.is_trial {
        let mut err = ApiError::too_many_requests(detail);
        if let Some(tokens) = trial.remaining_tokens {
            err = err.with_header("X-Trial-Remaining-Tokens", tokens.to_string());
        }
        if let Some(requests) = trial.remaining_requests {
            err = err.with_header("X-Trial-Remaining-Requests", requests.to_string());
        }
        err
    } else {
        ApiError::forbidden(detail)
    }
}

/// Outcome of a dispatch
pub enum DispatchOutcome {
    /// Buffered response, fully accounted
    Buffered(ChatResponse),
    /// Upstream stream plus the environment that finalizes it exactly once
    Streaming {
        /// Chunks from the winning provider
        upstream: ChunkStream,
        /// Finalization environment handed to the SSE assembler
        env: FinalizeEnv,
    },
}

impl std::fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(_) => f.debug_tuple("Buffered").finish(),
            Self::Streaming { .. } => f.debug_struct("Streaming").finish_non_exhaustive(),
        }
    }
}

/// Dispatch an admitted request through the failover chain.
///
/// # Errors
/// Returns the last attempt's classified error, or a non-retryable error
/// from any attempt.
pub async fn dispatch(
    state: &AppState,
    admitted: Admitted,
    mut request: ChatRequest,
    session_id: Option<i64>,
) -> Result<DispatchOutcome, ApiError> {
    let Admitted {
        ctx,
        user,
        trial,
        guard,
        reserved_tokens,
    } = admitted;

    if let Err(e) = request.validate() {
        if let Some(g) = &guard {
            g.release().await;
        }
        return Err(e.into());
    }

    splice_history(state, &ctx, session_id, &mut request.messages).await;

    let resolution = state
        .resolver
        .resolve(&ctx.model, ctx.declared_provider.as_deref());
    let chain = build_failover_chain(&resolution.provider);

    info!(
        request_id = %ctx.request_id,
        provider = %resolution.provider,
        chain_len = chain.len(),
        "Failover chain built"
    );

    let started = Instant::now();
    let mut last_error: Option<ClassifiedError> = None;

    for (index, provider_name) in chain.iter().enumerate() {
        let attempt_model = transform_model_id(&ctx.model, provider_name);
        let upstream_request = request.clone().with_model(attempt_model.clone());

        let attempt = attempt_provider(state, &ctx, provider_name, &upstream_request).await;

        let classified = match attempt {
            Ok(AttemptSuccess::Buffered(response)) => {
                let env = FinalizeEnv {
                    state: state.clone(),
                    ctx,
                    user,
                    trial,
                    guard,
                    reserved_tokens,
                    provider: provider_name.clone(),
                    provider_model: attempt_model,
                    session_id,
                    messages: request.messages,
                    started,
                };
                return finalize_buffered(env, response).await;
            }
            Ok(AttemptSuccess::Streaming(upstream)) => {
                let env = FinalizeEnv {
                    state: state.clone(),
                    ctx,
                    user,
                    trial,
                    guard,
                    reserved_tokens,
                    provider: provider_name.clone(),
                    provider_model: attempt_model,
                    session_id,
                    messages: request.messages,
                    started,
                };
                return Ok(DispatchOutcome::Streaming { upstream, env });
            }
            Err(classified) => classified,
        };

        let is_last = index + 1 == chain.len();
        if classified.retryable && !is_last {
            warn!(
                request_id = %ctx.request_id,
                provider = %provider_name,
                status = classified.status,
                detail = %classified.detail,
                next = %chain[index + 1],
                "Provider failed, falling back"
            );
            last_error = Some(classified);
            continue;
        }

        // Non-retryable, or the chain is exhausted: surface this attempt
        if let Some(g) = &guard {
            g.release().await;
        }
        error!(
            request_id = %ctx.request_id,
            provider = %provider_name,
            status = classified.status,
            detail = %classified.detail,
            "Dispatch failed"
        );
        return Err(ApiError::from_classified(classified));
    }

    // Unreachable with a non-empty chain; kept for the empty-registry case
    if let Some(g) = &guard {
        g.release().await;
    }
    Err(last_error.map_or_else(
        || ApiError::service_unavailable("No providers available"),
        ApiError::from_classified,
    ))
}

enum AttemptSuccess {
    Buffered(ChatResponse),
    Streaming(ChunkStream),
}

/// One attempt against one provider, under its time budget.
async fn attempt_provider(
    state: &AppState,
    ctx: &RequestContext,
    provider_name: &str,
    request: &ChatRequest,
) -> Result<AttemptSuccess, ClassifiedError> {
    let Some(adapter) = state.providers.get(provider_name) else {
        return Err(classify(
            provider_name,
            &ctx.model,
            &GatewayError::configuration(format!("provider {provider_name} not registered")),
        ));
    };

    let budget = adapter.timeout();
    let error = if ctx.streaming {
        match tokio::time::timeout(budget, adapter.send_stream(request)).await {
            Ok(Ok(stream)) => return Ok(AttemptSuccess::Streaming(stream)),
            Ok(Err(e)) => e,
            Err(_) => GatewayError::timeout(budget),
        }
    } else {
        match tokio::time::timeout(budget, adapter.send(request)).await {
            Ok(Ok(response)) => return Ok(AttemptSuccess::Buffered(response)),
            Ok(Err(e)) => e,
            Err(_) => GatewayError::timeout(budget),
        }
    };

    Err(classify(provider_name, &ctx.model, &error))
}

/// Prepend stored session history ahead of the new turns. A history fetch
/// failure never fails the request.
async fn splice_history(
    state: &AppState,
    ctx: &RequestContext,
    session_id: Option<i64>,
    messages: &mut Vec<ChatMessage>,
) {
    let Some(session_id) = session_id else { return };

    match state.history.get(session_id, &ctx.user_id).await {
        Ok(Some(history)) => {
            let mut spliced = Vec::with_capacity(history.len() + messages.len());
            for message in history {
                if let Ok(role) = MessageRole::parse(&message.role) {
                    spliced.push(ChatMessage {
                        role,
                        content: MessageContent::Text(message.content),
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
            info!(
                request_id = %ctx.request_id,
                session_id,
                spliced = spliced.len(),
                "Injected session history"
            );
            spliced.append(messages);
            *messages = spliced;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(session_id, error = %e, "Failed to fetch chat history");
        }
    }
}

/// Everything needed to finalize usage exactly once for one request
pub struct FinalizeEnv {
    /// Application state handle
    pub state: AppState,
    /// Request context
    pub ctx: RequestContext,
    /// Resolved account
    pub user: UserAccount,
    /// Trial status
    pub trial: TrialStatus,
    /// Concurrency guard, released during finalization
    pub guard: Option<ConcurrencyGuard>,
    /// Tokens reserved at admission
    pub reserved_tokens: u64,
    /// Provider that served the request
    pub provider: String,
    /// Provider-specific model id actually sent
    pub provider_model: String,
    /// Chat session to persist into
    pub session_id: Option<i64>,
    /// Messages sent upstream, for history persistence and estimation
    pub messages: Vec<ChatMessage>,
    /// Dispatch start time
    pub started: Instant,
}

impl FinalizeEnv {
    /// Estimate prompt tokens from message text when the provider omits
    /// usage. Explicitly an approximation.
    #[must_use]
    pub fn estimated_prompt_tokens(&self) -> u32 {
        let chars: usize = self.messages.iter().map(|m| m.content.char_count()).sum();
        approx_token_count(chars)
    }

    /// Run the accounting sequence: trial tracking or credit deduction,
    /// usage recording, limiter reconciliation, activity log, history
    /// save, concurrency release. Each collaborator failure is logged and
    /// swallowed; nothing unwinds already-applied effects.
    pub async fn finalize(
        self,
        usage: TokenUsage,
        content: &str,
        finish_reason: &str,
        estimated: bool,
    ) {
        let elapsed = self.started.elapsed();
        let cost = self
            .state
            .pricing
            .cost(&self.ctx.model, usage.prompt_tokens, usage.completion_tokens);

        let record = UsageRecord {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            latency: elapsed,
            cost,
            provider: self.provider.clone(),
            model: self.provider_model.clone(),
            streamed: self.ctx.streaming,
            estimated,
        };

        if self.trial.is_trial {
            if !self.trial.is_expired {
                if let Err(e) = self
                    .state
                    .trial
                    .track_usage(&self.ctx.api_key, u64::from(usage.total_tokens), 1)
                    .await
                {
                    warn!(error = %e, "Failed to track trial usage");
                }
            }
        } else {
            let metadata = json!({
                "model": self.ctx.model,
                "provider": self.provider,
                "total_tokens": usage.total_tokens,
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "cost_usd": cost,
            });
            if let Err(e) = self
                .state
                .billing
                .deduct_credits(
                    &self.ctx.api_key,
                    cost,
                    &format!("API usage - {}", self.ctx.model),
                    metadata,
                )
                .await
            {
                error!(error = %e, "Credit deduction failed");
            }
        }

        if let Err(e) = self
            .state
            .billing
            .record_usage(&self.ctx.user_id, &self.ctx.api_key, &record)
            .await
        {
            error!(error = %e, "Usage recording failed");
        }

        if !self.trial.is_trial {
            self.state
                .limiter
                .finalize(
                    &self.ctx.api_key,
                    self.reserved_tokens,
                    u64::from(usage.total_tokens),
                )
                .await;
        }

        let speed = if elapsed.as_secs_f64() > 0.0 {
            f64::from(usage.total_tokens) / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let entry = ActivityEntry {
            user_id: self.ctx.user_id.clone(),
            model: self.ctx.model.clone(),
            provider: self.provider.clone(),
            tokens: usage.total_tokens,
            cost,
            speed,
            finish_reason: finish_reason.to_string(),
            metadata: json!({
                "endpoint": self.ctx.dialect.endpoint(),
                "stream": self.ctx.streaming,
                "session_id": self.session_id,
                "request_id": self.ctx.request_id,
                "estimated": estimated,
            }),
        };
        if let Err(e) = self.state.activity.log(entry).await {
            warn!(error = %e, "Activity logging failed");
        }

        self.save_history(content, usage.total_tokens).await;

        if let Some(guard) = &self.guard {
            guard.release().await;
        }

        info!(
            request_id = %self.ctx.request_id,
            provider = %self.provider,
            tokens = usage.total_tokens,
            duration_ms = elapsed.as_millis(),
            estimated,
            "Usage finalized"
        );
    }

    async fn save_history(&self, content: &str, total_tokens: u32) {
        let Some(session_id) = self.session_id else {
            return;
        };

        let last_user = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(ChatMessage::text_content);

        if let Some(user_content) = last_user {
            if let Err(e) = self
                .state
                .history
                .save(
                    session_id,
                    &self.ctx.user_id,
                    "user",
                    &user_content,
                    &self.ctx.model,
                    0,
                )
                .await
            {
                error!(session_id, error = %e, "Failed to save user message");
            }
        }

        if !content.is_empty() {
            if let Err(e) = self
                .state
                .history
                .save(
                    session_id,
                    &self.ctx.user_id,
                    "assistant",
                    content,
                    &self.ctx.model,
                    total_tokens,
                )
                .await
            {
                error!(session_id, error = %e, "Failed to save assistant message");
            }
        }
    }
}

/// Finalize a buffered success: real usage from the adapter, post-hoc
/// plan check, then the accounting sequence.
async fn finalize_buffered(
    env: FinalizeEnv,
    mut response: ChatResponse,
) -> Result<DispatchOutcome, ApiError> {
    let estimated = response.usage.is_empty();
    if estimated {
        let completion_chars = response.first_text().map_or(0, str::len);
        response.usage = TokenUsage::new(
            env.estimated_prompt_tokens(),
            approx_token_count(completion_chars),
        );
    }
    let usage = response.usage;

    // Post-hoc plan check: content is withheld and nothing is charged,
    // but the usage tuple is still recorded so accounting stays
    // exactly-once per accepted request.
    let plan = env
        .state
        .entitlement
        .check_plan_limits(
            &env.ctx.user_id,
            u64::from(usage.total_tokens),
            env.ctx.environment,
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Plan limit check failed, allowing");
            relay_integrations::PlanDecision::allowed()
        });

    if !plan.allowed {
        let reason = plan.reason.unwrap_or_else(|| "unknown".to_string());
        let record = UsageRecord {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            latency: env.started.elapsed(),
            cost: 0.0,
            provider: env.provider.clone(),
            model: env.provider_model.clone(),
            streamed: false,
            estimated,
        };
        if let Err(e) = env
            .state
            .billing
            .record_usage(&env.ctx.user_id, &env.ctx.api_key, &record)
            .await
        {
            error!(error = %e, "Usage recording failed");
        }
        if let Some(guard) = &env.guard {
            guard.release().await;
        }
        return Err(
            ApiError::too_many_requests(format!("Plan limit exceeded: {reason}")),
        );
    }

    let content = response.first_text().unwrap_or_default().to_string();
    let finish_reason = response.choices.first().and_then(|c| c.finish_reason).map_or_else(
        || FinishReason::Stop.to_string(),
        |r| r.to_string(),
    );

    env.finalize(usage, &content, &finish_reason, estimated).await;

    Ok(DispatchOutcome::Buffered(response))
}
