//! In-process rate limit store.
//!
//! Counters are per key, guarded by a per-key mutex inside a sharded map:
//! concurrent requests for the same key serialize on the counter update,
//! requests for different keys never contend.

use crate::config::RateLimitConfig;
use crate::store::{Decision, Denial, DenyReason, RateLimitStore};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::GatewayError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const HOUR_SECS: u64 = 3_600;
const DAY_SECS: u64 = 86_400;

/// Mutable counters for one key
#[derive(Debug)]
struct KeyState {
    /// Request timestamps per window
    minute_requests: VecDeque<Instant>,
    hour_requests: VecDeque<Instant>,
    day_requests: VecDeque<Instant>,
    /// (timestamp, tokens) entries per window; finalize appends signed
    /// corrections
    minute_tokens: VecDeque<(Instant, i64)>,
    hour_tokens: VecDeque<(Instant, i64)>,
    day_tokens: VecDeque<(Instant, i64)>,
    /// Burst bucket
    burst_tokens: f64,
    burst_refilled_at: Instant,
    /// In-flight request count
    in_flight: u64,
}

impl KeyState {
    fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            minute_requests: VecDeque::new(),
            hour_requests: VecDeque::new(),
            day_requests: VecDeque::new(),
            minute_tokens: VecDeque::new(),
            hour_tokens: VecDeque::new(),
            day_tokens: VecDeque::new(),
            burst_tokens: config.burst_limit as f64,
            burst_refilled_at: now,
            in_flight: 0,
        }
    }

    /// Evict entries older than each window boundary
    fn evict(&mut self, now: Instant, minute_window: Duration) {
        Self::evict_requests(&mut self.minute_requests, now, minute_window);
        Self::evict_requests(&mut self.hour_requests, now, Duration::from_secs(HOUR_SECS));
        Self::evict_requests(&mut self.day_requests, now, Duration::from_secs(DAY_SECS));
        Self::evict_tokens(&mut self.minute_tokens, now, minute_window);
        Self::evict_tokens(&mut self.hour_tokens, now, Duration::from_secs(HOUR_SECS));
        Self::evict_tokens(&mut self.day_tokens, now, Duration::from_secs(DAY_SECS));
    }

    fn evict_requests(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while deque
            .front()
            .is_some_and(|t| now.duration_since(*t) > window)
        {
            deque.pop_front();
        }
    }

    fn evict_tokens(deque: &mut VecDeque<(Instant, i64)>, now: Instant, window: Duration) {
        while deque
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) > window)
        {
            deque.pop_front();
        }
    }

    /// Refill the burst bucket based on elapsed time
    fn refill_burst(&mut self, now: Instant, config: &RateLimitConfig) {
        let elapsed = now.duration_since(self.burst_refilled_at).as_secs_f64();
        let rate = config.burst_limit as f64 / config.window_size_seconds.max(1) as f64;
        self.burst_tokens = (self.burst_tokens + elapsed * rate).min(config.burst_limit as f64);
        self.burst_refilled_at = now;
    }

    fn token_sum(deque: &VecDeque<(Instant, i64)>) -> i64 {
        deque.iter().map(|(_, t)| *t).sum::<i64>().max(0)
    }

    /// Seconds until the oldest entry of a window ages out
    fn reset_in(deque: &VecDeque<Instant>, now: Instant, window: Duration) -> u64 {
        deque.front().map_or(window.as_secs(), |oldest| {
            window
                .saturating_sub(now.duration_since(*oldest))
                .as_secs()
                .max(1)
        })
    }

    fn token_reset_in(deque: &VecDeque<(Instant, i64)>, now: Instant, window: Duration) -> u64 {
        deque.front().map_or(window.as_secs(), |(oldest, _)| {
            window
                .saturating_sub(now.duration_since(*oldest))
                .as_secs()
                .max(1)
        })
    }
}

/// In-process `RateLimitStore`
pub struct MemoryStore {
    keys: DashMap<String, Mutex<KeyState>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
        }
    }

    /// Current in-flight count for a key, for tests and introspection
    #[must_use]
    pub fn in_flight(&self, key: &str) -> u64 {
        self.keys
            .get(key)
            .map_or(0, |state| state.lock().in_flight)
    }

    fn check_locked(
        state: &mut KeyState,
        config: &RateLimitConfig,
        estimated_tokens: u64,
        now: Instant,
    ) -> Decision {
        let minute_window = Duration::from_secs(config.window_size_seconds.max(1));
        state.evict(now, minute_window);
        state.refill_burst(now, config);

        // 1) concurrency cap
        if state.in_flight >= config.concurrency_limit {
            return Decision::Denied(Denial {
                reason: DenyReason::Concurrency,
                retry_after: minute_window.as_secs(),
            });
        }

        // 2) burst bucket
        if state.burst_tokens < 1.0 {
            let deficit = 1.0 - state.burst_tokens;
            let rate = config.burst_limit as f64 / config.window_size_seconds.max(1) as f64;
            let retry_after = (deficit / rate).ceil() as u64;
            return Decision::Denied(Denial {
                reason: DenyReason::Burst,
                retry_after: retry_after.max(1),
            });
        }

        // 3) sliding windows, request and token counts
        let tokens = estimated_tokens as i64;
        let checks: [(bool, DenyReason, u64); 6] = [
            (
                state.minute_requests.len() as u64 >= config.requests_per_minute,
                DenyReason::RequestsPerMinute,
                KeyState::reset_in(&state.minute_requests, now, minute_window),
            ),
            (
                KeyState::token_sum(&state.minute_tokens) + tokens
                    > config.tokens_per_minute as i64,
                DenyReason::TokensPerMinute,
                KeyState::token_reset_in(&state.minute_tokens, now, minute_window),
            ),
            (
                state.hour_requests.len() as u64 >= config.requests_per_hour,
                DenyReason::RequestsPerHour,
                KeyState::reset_in(&state.hour_requests, now, Duration::from_secs(HOUR_SECS)),
            ),
            (
                KeyState::token_sum(&state.hour_tokens) + tokens > config.tokens_per_hour as i64,
                DenyReason::TokensPerHour,
                KeyState::token_reset_in(&state.hour_tokens, now, Duration::from_secs(HOUR_SECS)),
            ),
            (
                state.day_requests.len() as u64 >= config.requests_per_day,
                DenyReason::RequestsPerDay,
                KeyState::reset_in(&state.day_requests, now, Duration::from_secs(DAY_SECS)),
            ),
            (
                KeyState::token_sum(&state.day_tokens) + tokens > config.tokens_per_day as i64,
                DenyReason::TokensPerDay,
                KeyState::token_reset_in(&state.day_tokens, now, Duration::from_secs(DAY_SECS)),
            ),
        ];

        for (blocked, reason, retry_after) in checks {
            if blocked {
                return Decision::Denied(Denial {
                    reason,
                    retry_after,
                });
            }
        }

        // All checks passed: commit atomically under the lock
        state.burst_tokens -= 1.0;
        state.minute_requests.push_back(now);
        state.hour_requests.push_back(now);
        state.day_requests.push_back(now);
        state.minute_tokens.push_back((now, tokens));
        state.hour_tokens.push_back((now, tokens));
        state.day_tokens.push_back((now, tokens));
        state.in_flight += 1;

        Decision::Allowed
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn check_and_reserve(
        &self,
        key: &str,
        config: &RateLimitConfig,
        estimated_tokens: u64,
    ) -> Result<Decision, GatewayError> {
        let entry = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(KeyState::new(config)));
        let mut state = entry.lock();
        Ok(Self::check_locked(
            &mut state,
            config,
            estimated_tokens,
            Instant::now(),
        ))
    }

    async fn release(&self, key: &str) {
        if let Some(entry) = self.keys.get(key) {
            let mut state = entry.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
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
        if let Some(entry) = self.keys.get(key) {
            let mut state = entry.lock();
            let now = Instant::now();
            state.minute_tokens.push_back((now, delta));
            state.hour_tokens.push_back((now, delta));
            state.day_tokens.push_back((now, delta));
        }
        Ok(())
    }
}
