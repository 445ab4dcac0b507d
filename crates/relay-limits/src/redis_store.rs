//! Redis-backed rate limit store for multi-instance deployments.
//!
//! Windows are bucketed counters keyed by the wall-clock bucket
//! (`rl:{key}:m:{yyyymmddHHMM}`), incremented on admission and expired at
//! twice the window so clock skew between instances is harmless. The
//! burst bucket is a small hash refilled on read. Store errors surface to
//! the facade, which fails open.
//!
//! The in-flight counter lives in Redis too, so the concurrency cap holds
//! across instances sharing a key.

use crate::config::RateLimitConfig;
use crate::store::{Decision, Denial, DenyReason, RateLimitStore};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use relay_core::GatewayError;
use tracing::debug;

const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 86_400;

/// Redis-backed `RateLimitStore`
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Errors
    /// Returns a configuration error when the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url)
            .map_err(|e| GatewayError::configuration(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| GatewayError::configuration(format!("redis connection failed: {e}")))?;
        Ok(Self { conn })
    }

    fn store_err(e: &redis::RedisError) -> GatewayError {
        GatewayError::internal(format!("rate limit store unreachable: {e}"))
    }

    fn bucket_keys(key: &str) -> (String, String, String) {
        let now = Utc::now();
        (
            format!("rl:{key}:m:{}", now.format("%Y%m%d%H%M")),
            format!("rl:{key}:h:{}", now.format("%Y%m%d%H")),
            format!("rl:{key}:d:{}", now.format("%Y%m%d")),
        )
    }

    fn inflight_key(key: &str) -> String {
        format!("rl:{key}:inflight")
    }

    fn burst_key(key: &str) -> String {
        format!("rl:{key}:burst")
    }

    async fn read_counter(
        conn: &mut ConnectionManager,
        key: &str,
    ) -> Result<u64, GatewayError> {
        let value: Option<u64> = conn.get(key).await.map_err(|e| Self::store_err(&e))?;
        Ok(value.unwrap_or(0))
    }

    /// Refill-and-consume on the burst hash; returns the denial when the
    /// bucket is empty.
    async fn take_burst_token(
        conn: &mut ConnectionManager,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<Option<Denial>, GatewayError> {
        let burst_key = Self::burst_key(key);
        let now = Utc::now().timestamp_millis() as f64 / 1_000.0;

        let tokens: Option<String> = conn
            .hget(&burst_key, "tokens")
            .await
            .map_err(|e| Self::store_err(&e))?;
        let last_refill: Option<String> = conn
            .hget(&burst_key, "last_refill")
            .await
            .map_err(|e| Self::store_err(&e))?;

        let mut tokens: f64 = tokens
            .and_then(|t| t.parse().ok())
            .unwrap_or(config.burst_limit as f64);
        let last_refill: f64 = last_refill.and_then(|t| t.parse().ok()).unwrap_or(now);

        let rate = config.burst_limit as f64 / config.window_size_seconds.max(1) as f64;
        tokens = (tokens + (now - last_refill).max(0.0) * rate).min(config.burst_limit as f64);

        if tokens < 1.0 {
            let retry_after = (((1.0 - tokens) / rate).ceil() as u64).max(1);
            return Ok(Some(Denial {
                reason: DenyReason::Burst,
                retry_after,
            }));
        }

        let () = conn
            .hset(&burst_key, "tokens", (tokens - 1.0).to_string())
            .await
            .map_err(|e| Self::store_err(&e))?;
        let () = conn
            .hset(&burst_key, "last_refill", now.to_string())
            .await
            .map_err(|e| Self::store_err(&e))?;
        let () = conn
            .expire(&burst_key, 300)
            .await
            .map_err(|e| Self::store_err(&e))?;
        Ok(None)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn check_and_reserve(
        &self,
        key: &str,
        config: &RateLimitConfig,
        estimated_tokens: u64,
    ) -> Result<Decision, GatewayError> {
        let mut conn = self.conn.clone();

        // 1) concurrency cap
        let in_flight = Self::read_counter(&mut conn, &Self::inflight_key(key)).await?;
        if in_flight >= config.concurrency_limit {
            return Ok(Decision::Denied(Denial {
                reason: DenyReason::Concurrency,
                retry_after: config.window_size_seconds,
            }));
        }

        // 2) burst bucket
        if let Some(denial) = Self::take_burst_token(&mut conn, key, config).await? {
            return Ok(Decision::Denied(denial));
        }

        // 3) bucketed windows
        let (minute, hour, day) = Self::bucket_keys(key);
        let checks: [(String, u64, u64, DenyReason, DenyReason, u64); 3] = [
            (
                minute.clone(),
                config.requests_per_minute,
                config.tokens_per_minute,
                DenyReason::RequestsPerMinute,
                DenyReason::TokensPerMinute,
                60,
            ),
            (
                hour.clone(),
                config.requests_per_hour,
                config.tokens_per_hour,
                DenyReason::RequestsPerHour,
                DenyReason::TokensPerHour,
                HOUR_SECS as u64,
            ),
            (
                day.clone(),
                config.requests_per_day,
                config.tokens_per_day,
                DenyReason::RequestsPerDay,
                DenyReason::TokensPerDay,
                DAY_SECS as u64,
            ),
        ];

        for (bucket, request_limit, token_limit, request_reason, token_reason, window) in &checks {
            let requests = Self::read_counter(&mut conn, &format!("{bucket}:req")).await?;
            if requests >= *request_limit {
                return Ok(Decision::Denied(Denial {
                    reason: *request_reason,
                    retry_after: *window,
                }));
            }
            let tokens = Self::read_counter(&mut conn, &format!("{bucket}:tok")).await?;
            if tokens + estimated_tokens > *token_limit {
                return Ok(Decision::Denied(Denial {
                    reason: *token_reason,
                    retry_after: *window,
                }));
            }
        }

        // All checks passed: commit counters in one round trip
        let mut pipe = redis::pipe();
        for (bucket, _, _, _, _, window) in &checks {
            let expiry = (*window as i64) * 2;
            pipe.incr(format!("{bucket}:req"), 1_u64).ignore();
            pipe.expire(format!("{bucket}:req"), expiry).ignore();
            pipe.incr(format!("{bucket}:tok"), estimated_tokens).ignore();
            pipe.expire(format!("{bucket}:tok"), expiry).ignore();
        }
        pipe.incr(Self::inflight_key(key), 1_u64).ignore();
        pipe.expire(Self::inflight_key(key), HOUR_SECS).ignore();
        let () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::store_err(&e))?;

        debug!(key_suffix = %&key[key.len().saturating_sub(4)..], "rate limit reserved");
        Ok(Decision::Allowed)
    }

    async fn release(&self, key: &str) {
        let mut conn = self.conn.clone();
        let inflight = Self::inflight_key(key);
        // Best effort; an unreachable store must not wedge completion
        let result: Result<i64, _> = conn.decr(&inflight, 1_i64).await;
        match result {
            Ok(value) if value < 0 => {
                let _: Result<(), _> = conn.set(&inflight, 0_i64).await;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "failed to release concurrency in redis"),
        }
    }

    async fn finalize(
        &self,
        key: &str,
        _config: &RateLimitConfig,
        reserved_tokens: u64,
        actual_tokens: u64,
    ) -> Result<(), GatewayError> {
        let delta = actual_tokens as i64 - reserved_tokens as i64;
        if delta == 0 {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let (minute, hour, day) = Self::bucket_keys(key);
        let mut pipe = redis::pipe();
        for bucket in [&minute, &hour, &day] {
            pipe.incr(format!("{bucket}:tok"), delta).ignore();
        }
        let () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::store_err(&e))?;
        Ok(())
    }
}
