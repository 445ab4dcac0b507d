//! Shared application state.
//!
//! Every process-scoped cache and collaborator handle is injected here so
//! tests can substitute fakes; nothing in the request path reaches for a
//! global.

use relay_config::GatewayConfig;
use relay_integrations::{
    Activity, Billing, ChatHistory, Entitlement, Identity, NoopActivity, NoopBilling,
    NoopChatHistory, NoopEntitlement, NoopTrialGate, OpenIdentity, TrialGate,
};
use relay_limits::{MemoryStore, RateLimitConfig, RateLimiter};
use relay_providers::ProviderRegistry;
use relay_routing::{CatalogCache, Resolver};
use relay_telemetry::PricingTable;
use std::sync::Arc;

/// Shared application state, cheap to clone
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,
    /// Provider name → adapter
    pub providers: Arc<ProviderRegistry>,
    /// Model catalog cache
    pub catalogs: Arc<CatalogCache>,
    /// Model/provider resolver
    pub resolver: Arc<Resolver>,
    /// Rate limiter facade
    pub limiter: Arc<RateLimiter>,
    /// Model pricing table
    pub pricing: Arc<PricingTable>,
    /// Key-to-user resolution
    pub identity: Arc<dyn Identity>,
    /// Plan limit enforcement
    pub entitlement: Arc<dyn Entitlement>,
    /// Trial validation and tracking
    pub trial: Arc<dyn TrialGate>,
    /// Credits and usage recording
    pub billing: Arc<dyn Billing>,
    /// Activity feed
    pub activity: Arc<dyn Activity>,
    /// Chat history persistence
    pub history: Arc<dyn ChatHistory>,
}

impl AppState {
    /// Start building state
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

/// Builder for [`AppState`] with permissive defaults
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Arc<GatewayConfig>>,
    providers: Option<Arc<ProviderRegistry>>,
    catalogs: Option<Arc<CatalogCache>>,
    limiter: Option<Arc<RateLimiter>>,
    pricing: Option<Arc<PricingTable>>,
    identity: Option<Arc<dyn Identity>>,
    entitlement: Option<Arc<dyn Entitlement>>,
    trial: Option<Arc<dyn TrialGate>>,
    billing: Option<Arc<dyn Billing>>,
    activity: Option<Arc<dyn Activity>>,
    history: Option<Arc<dyn ChatHistory>>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Set the provider registry
    #[must_use]
    pub fn providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Set the catalog cache
    #[must_use]
    pub fn catalogs(mut self, catalogs: Arc<CatalogCache>) -> Self {
        self.catalogs = Some(catalogs);
        self
    }

    /// Set the rate limiter
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Set the pricing table
    #[must_use]
    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Some(Arc::new(pricing));
        self
    }

    /// Set the identity collaborator
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn Identity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the entitlement collaborator
    #[must_use]
    pub fn entitlement(mut self, entitlement: Arc<dyn Entitlement>) -> Self {
        self.entitlement = Some(entitlement);
        self
    }

    /// Set the trial collaborator
    #[must_use]
    pub fn trial(mut self, trial: Arc<dyn TrialGate>) -> Self {
        self.trial = Some(trial);
        self
    }

    /// Set the billing collaborator
    #[must_use]
    pub fn billing(mut self, billing: Arc<dyn Billing>) -> Self {
        self.billing = Some(billing);
        self
    }

    /// Set the activity collaborator
    #[must_use]
    pub fn activity(mut self, activity: Arc<dyn Activity>) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Set the chat history collaborator
    #[must_use]
    pub fn history(mut self, history: Arc<dyn ChatHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Build the state, filling defaults for anything unset
    #[must_use]
    pub fn build(self) -> AppState {
        let config = self.config.unwrap_or_else(|| Arc::new(GatewayConfig::default()));
        let catalogs = self
            .catalogs
            .unwrap_or_else(|| Arc::new(CatalogCache::new(config.catalog.ttl)));
        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(
                RateLimiter::with_static_config(
                    Arc::new(MemoryStore::new()),
                    RateLimitConfig::default(),
                )
                .disabled(config.rate_limit.disabled),
            )
        });

        AppState {
            resolver: Arc::new(Resolver::new(Arc::clone(&catalogs))),
            config,
            providers: self.providers.unwrap_or_else(|| Arc::new(ProviderRegistry::new())),
            catalogs,
            limiter,
            pricing: self.pricing.unwrap_or_else(|| Arc::new(PricingTable::new())),
            identity: self.identity.unwrap_or_else(|| Arc::new(OpenIdentity)),
            entitlement: self.entitlement.unwrap_or_else(|| Arc::new(NoopEntitlement)),
            trial: self.trial.unwrap_or_else(|| Arc::new(NoopTrialGate)),
            billing: self.billing.unwrap_or_else(|| Arc::new(NoopBilling)),
            activity: self.activity.unwrap_or_else(|| Arc::new(NoopActivity)),
            history: self.history.unwrap_or_else(|| Arc::new(NoopChatHistory)),
        }
    }
}
