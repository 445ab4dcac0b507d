//! # Model Relay Gateway
//!
//! Multi-provider LLM relay gateway with transparent failover, per-key
//! rate limiting, and SSE streaming.
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! model-relay-gateway
//!
//! # Start with a custom config file
//! RELAY_CONFIG=/path/to/config.yaml model-relay-gateway
//!
//! # Override the bind address
//! RELAY_PORT=9000 model-relay-gateway
//! ```

use relay_config::{load_config, GatewayConfig, RateLimitStoreKind};
use relay_limits::{MemoryStore, RateLimitConfig, RateLimitStore, RateLimiter, RedisStore};
use relay_providers::{HttpProvider, HttpProviderConfig, ProviderRegistry};
use relay_routing::CatalogCache;
use relay_server::{AppState, Server, ServerConfig};
use relay_telemetry::{init_logging, LoggingConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Logging first, config controls the rest
    if let Err(e) = init_logging(&LoggingConfig::new().with_level("info")) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Model Relay Gateway"
    );

    if let Err(e) = run().await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        providers = config.providers.len(),
        "Configuration loaded"
    );

    let registry = create_provider_registry(&config)?;
    info!(registered = registry.len(), "Provider registry initialized");

    let catalogs = Arc::new(CatalogCache::new(config.catalog.ttl));
    for provider in &config.providers {
        if !provider.models.is_empty() {
            catalogs.set_models(&provider.name, provider.models.iter().cloned());
        }
    }

    let limiter = create_rate_limiter(&config).await;

    let state = AppState::builder()
        .config(config.clone())
        .providers(Arc::new(registry))
        .catalogs(catalogs)
        .limiter(limiter)
        .build();

    let server_config = ServerConfig::new()
        .with_host(&config.server.host)
        .with_port(config.server.port);

    Server::new(server_config, state).run().await?;
    Ok(())
}

/// Build the registry from configuration; providers without credentials
/// are still registered so the classifier reports them as unavailable
/// and the chain advances past them.
fn create_provider_registry(
    config: &GatewayConfig,
) -> Result<ProviderRegistry, Box<dyn std::error::Error>> {
    let registry = ProviderRegistry::new();

    for settings in &config.providers {
        if !settings.enabled {
            continue;
        }

        let mut provider_config =
            HttpProviderConfig::new(&settings.name, &settings.base_url).with_timeout(settings.timeout);

        match settings.resolve_api_key() {
            Some(api_key) => provider_config = provider_config.with_api_key(api_key),
            None => warn!(
                provider = %settings.name,
                "No API key configured, provider will be skipped by failover"
            ),
        }

        let provider = HttpProvider::new(provider_config)?;
        registry.register(Arc::new(provider))?;
    }

    Ok(registry)
}

/// Select the rate limit store from configuration. A Redis connection
/// failure degrades to the in-process store rather than refusing to boot.
async fn create_rate_limiter(config: &GatewayConfig) -> Arc<RateLimiter> {
    let store: Arc<dyn RateLimitStore> = match config.rate_limit.store {
        RateLimitStoreKind::Memory => Arc::new(MemoryStore::new()),
        RateLimitStoreKind::Redis => match &config.rate_limit.redis_url {
            Some(url) => match RedisStore::connect(url).await {
                Ok(store) => {
                    info!("Rate limiting backed by Redis");
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, using in-process rate limiting");
                    Arc::new(MemoryStore::new())
                }
            },
            None => {
                warn!("rate_limit.store is redis but no redis_url set, using in-process store");
                Arc::new(MemoryStore::new())
            }
        },
    };

    Arc::new(
        RateLimiter::with_static_config(store, RateLimitConfig::default())
            .disabled(config.rate_limit.disabled),
    )
}
