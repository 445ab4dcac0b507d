//! The rate limiter facade.
//!
//! Owns per-key configuration caching, the fail-open policy, and the
//! concurrency release guard. Admission control correctness is secondary
//! to availability: when the backing store is unreachable the request is
//! allowed and a warning is logged.

use crate::config::RateLimitConfig;
use crate::store::{Decision, RateLimitStore};
use dashmap::DashMap;
use relay_core::context::mask_key;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-key configuration source. Implementations load from wherever limit
/// plans live; the default returns the built-in tier.
pub trait RateLimitConfigSource: Send + Sync {
    /// Limits for the given key
    fn config_for(&self, api_key: &str) -> RateLimitConfig;
}

/// Source returning the same configuration for every key
pub struct StaticConfigSource(pub RateLimitConfig);

impl RateLimitConfigSource for StaticConfigSource {
    fn config_for(&self, _api_key: &str) -> RateLimitConfig {
        self.0
    }
}

/// Successful admission: carries the reservation and the release guard
pub struct Admission {
    /// Tokens provisionally reserved at admission time
    pub reserved_tokens: u64,
    /// Release-exactly-once concurrency guard
    pub guard: ConcurrencyGuard,
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("reserved_tokens", &self.reserved_tokens)
            .finish_non_exhaustive()
    }
}

/// Rate limiter facade over a selected store
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    source: Arc<dyn RateLimitConfigSource>,
    /// Per-key config cache, loaded lazily for the process lifetime
    configs: DashMap<String, RateLimitConfig>,
    /// Disable admission entirely (testing only)
    disabled: bool,
}

impl RateLimiter {
    /// Create a limiter over the given store and config source
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, source: Arc<dyn RateLimitConfigSource>) -> Self {
        Self {
            store,
            source,
            configs: DashMap::new(),
            disabled: false,
        }
    }

    /// Create a limiter with uniform limits for every key
    #[must_use]
    pub fn with_static_config(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self::new(store, Arc::new(StaticConfigSource(config)))
    }

    /// Disable admission control (testing only)
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Cached limits for a key
    #[must_use]
    pub fn config_for(&self, api_key: &str) -> RateLimitConfig {
        if let Some(config) = self.configs.get(api_key) {
            return *config;
        }
        let config = self.source.config_for(api_key);
        self.configs.insert(api_key.to_string(), config);
        config
    }

    /// Check all limits and reserve on success.
    ///
    /// Returns `Decision::Allowed` with a guard via [`Self::admit`]; this
    /// lower-level form returns the raw decision and performs fail-open.
    pub async fn check_and_reserve(&self, api_key: &str, estimated_tokens: u64) -> Decision {
        if self.disabled {
            return Decision::Allowed;
        }
        let config = self.config_for(api_key);
        match self
            .store
            .check_and_reserve(api_key, &config, estimated_tokens)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                // Fail open: availability beats admission accuracy
                warn!(
                    key = %mask_key(api_key),
                    error = %e,
                    "Rate limit store unreachable, allowing request"
                );
                Decision::Allowed
            }
        }
    }

    /// Admission with a scoped release guard
    ///
    /// # Errors
    /// Returns the denial when any limit blocks the request.
    pub async fn admit(
        this: &Arc<Self>,
        api_key: &str,
        estimated_tokens: u64,
    ) -> Result<Admission, crate::store::Denial> {
        match this.check_and_reserve(api_key, estimated_tokens).await {
            Decision::Allowed => Ok(Admission {
                reserved_tokens: estimated_tokens,
                guard: ConcurrencyGuard::new(Arc::clone(this), api_key.to_string()),
            }),
            Decision::Denied(denial) => Err(denial),
        }
    }

    /// Reconcile the provisional token reservation with the real count
    pub async fn finalize(&self, api_key: &str, reserved_tokens: u64, actual_tokens: u64) {
        if self.disabled {
            return;
        }
        let config = self.config_for(api_key);
        if let Err(e) = self
            .store
            .finalize(api_key, &config, reserved_tokens, actual_tokens)
            .await
        {
            warn!(key = %mask_key(api_key), error = %e, "Rate limit finalize failed");
        }
    }

    async fn release(&self, api_key: &str) {
        if self.disabled {
            return;
        }
        self.store.release(api_key).await;
    }
}

/// Scoped concurrency release.
///
/// Release fires exactly once per admitted request on every exit path:
/// explicitly via [`ConcurrencyGuard::release`] on success or classified
/// error, or from `Drop` when the owning task is cancelled (client
/// disconnect), which spawns the release since `Drop` cannot await.
pub struct ConcurrencyGuard {
    limiter: Arc<RateLimiter>,
    api_key: String,
    released: Arc<AtomicBool>,
}

impl ConcurrencyGuard {
    fn new(limiter: Arc<RateLimiter>, api_key: String) -> Self {
        Self {
            limiter,
            api_key,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Release the concurrency slot now
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.limiter.release(&self.api_key).await;
        debug!(key = %mask_key(&self.api_key), "concurrency released");
    }
}

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let limiter = Arc::clone(&self.limiter);
        let api_key = std::mem::take(&mut self.api_key);
        // Cancellation path: hand the release to the runtime
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                limiter.release(&api_key).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::DenyReason;
    use async_trait::async_trait;
    use relay_core::GatewayError;

    fn limiter_with(config: RateLimitConfig) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::with_static_config(
            Arc::new(MemoryStore::new()),
            config,
        ))
    }

    #[tokio::test]
    async fn test_admit_and_release_balances() {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::with_static_config(
            Arc::clone(&store) as Arc<dyn RateLimitStore>,
            RateLimitConfig::default(),
        ));

        let admission = RateLimiter::admit(&limiter, "sk-test", 0).await.expect("admitted");
        assert_eq!(store.in_flight("sk-test"), 1);
        admission.guard.release().await;
        assert_eq!(store.in_flight("sk-test"), 0);

        // Double release is a no-op
        admission.guard.release().await;
        assert_eq!(store.in_flight("sk-test"), 0);
    }

    #[tokio::test]
    async fn test_guard_drop_releases() {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::with_static_config(
            Arc::clone(&store) as Arc<dyn RateLimitStore>,
            RateLimitConfig::default(),
        ));

        {
            let _admission = RateLimiter::admit(&limiter, "sk-test", 0).await.expect("admitted");
            assert_eq!(store.in_flight("sk-test"), 1);
        }
        // Drop spawns the release; give it a tick
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.in_flight("sk-test"), 0);
    }

    #[tokio::test]
    async fn test_denial_reports_reason() {
        let mut config = RateLimitConfig::default();
        config.concurrency_limit = 1;
        let limiter = limiter_with(config);

        let _held = RateLimiter::admit(&limiter, "sk-test", 0).await.expect("admitted");
        let denial = RateLimiter::admit(&limiter, "sk-test", 0).await.expect_err("denied");
        assert_eq!(denial.reason, DenyReason::Concurrency);
    }

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn check_and_reserve(
            &self,
            _key: &str,
            _config: &RateLimitConfig,
            _estimated_tokens: u64,
        ) -> Result<Decision, GatewayError> {
            Err(GatewayError::internal("store down"))
        }

        async fn release(&self, _key: &str) {}

        async fn finalize(
            &self,
            _key: &str,
            _config: &RateLimitConfig,
            _reserved: u64,
            _actual: u64,
        ) -> Result<(), GatewayError> {
            Err(GatewayError::internal("store down"))
        }
    }

    #[tokio::test]
    async fn test_fail_open_when_store_unreachable() {
        let limiter = Arc::new(RateLimiter::with_static_config(
            Arc::new(FailingStore),
            RateLimitConfig::default(),
        ));
        assert!(RateLimiter::admit(&limiter, "sk-test", 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_allows_everything() {
        let mut config = RateLimitConfig::default();
        config.requests_per_minute = 0;
        let limiter = Arc::new(
            RateLimiter::with_static_config(Arc::new(MemoryStore::new()), config).disabled(true),
        );
        assert!(RateLimiter::admit(&limiter, "sk-test", 0).await.is_ok());
    }
}
