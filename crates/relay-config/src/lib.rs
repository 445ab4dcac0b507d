//! # Relay Config
//!
//! Configuration loading for the Model Relay Gateway.
//!
//! Configuration comes from a YAML file (path in `RELAY_CONFIG`, default
//! `config.yaml`) with environment variable overrides for the common
//! deployment knobs (`RELAY_HOST`, `RELAY_PORT`, `RELAY_REDIS_URL`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// YAML was malformed
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Rate limiter settings
    pub rate_limit: RateLimitSettings,
    /// Model catalog cache settings
    pub catalog: CatalogSettings,
    /// Upstream provider endpoints
    pub providers: Vec<ProviderSettings>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
            rate_limit: RateLimitSettings::default(),
            catalog: CatalogSettings::default(),
            providers: default_providers(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (overridden by `RUST_LOG`)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Which backing store the rate limiter uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStoreKind {
    /// In-process store (single instance deployments)
    #[default]
    Memory,
    /// Shared Redis store (multi-instance deployments)
    Redis,
}

/// Rate limiter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Store selection
    pub store: RateLimitStoreKind,
    /// Redis connection URL, required when `store: redis`
    pub redis_url: Option<String>,
    /// Disable admission control entirely (testing only)
    pub disabled: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            store: RateLimitStoreKind::Memory,
            redis_url: None,
            disabled: false,
        }
    }
}

/// Model catalog cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// How long a catalog snapshot stays fresh
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
        }
    }
}

/// One upstream provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name as used in failover chains
    pub name: String,
    /// OpenAI-compatible base URL (ending in `/v1` or equivalent)
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Inline API key; prefer `api_key_env` outside development
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request time budget
    #[serde(with = "humantime_serde", default = "default_provider_timeout")]
    pub timeout: Duration,
    /// Whether the provider is registered at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Static model catalog used by the resolver's catalog probe
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

impl ProviderSettings {
    /// Resolve the API key from the inline value or the environment
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
        })
    }
}

/// Built-in provider endpoints, mirroring the deployed fleet. Slower
/// providers carry a longer time budget.
#[must_use]
pub fn default_providers() -> Vec<ProviderSettings> {
    let entry = |name: &str, base_url: &str, env: &str, timeout_secs: u64| ProviderSettings {
        name: name.to_string(),
        base_url: base_url.to_string(),
        api_key_env: Some(env.to_string()),
        api_key: None,
        timeout: Duration::from_secs(timeout_secs),
        enabled: true,
        models: Vec::new(),
    };

    vec![
        entry("openrouter", "https://openrouter.ai/api/v1", "OPENROUTER_API_KEY", 60),
        entry("huggingface", "https://router.huggingface.co/v1", "HF_API_KEY", 120),
        entry("featherless", "https://api.featherless.ai/v1", "FEATHERLESS_API_KEY", 60),
        entry("fireworks", "https://api.fireworks.ai/inference/v1", "FIREWORKS_API_KEY", 60),
        entry("together", "https://api.together.xyz/v1", "TOGETHER_API_KEY", 60),
        entry("google-vertex", "https://aiplatform.googleapis.com/v1/openapi", "GOOGLE_VERTEX_API_KEY", 120),
        entry("vercel-ai-gateway", "https://ai-gateway.vercel.sh/v1", "VERCEL_AI_GATEWAY_API_KEY", 60),
        entry("aihubmix", "https://aihubmix.com/v1", "AIHUBMIX_API_KEY", 60),
        entry("anannas", "https://api.anannas.ai/v1", "ANANNAS_API_KEY", 60),
    ]
}

/// Load configuration from disk and the environment.
///
/// A missing config file is not an error; defaults apply and a note is
/// logged.
///
/// # Errors
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    let path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    let mut config = if Path::new(&path).exists() {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: GatewayConfig = serde_yaml::from_str(&raw)?;
        info!(path = %path, "Configuration loaded");
        config
    } else {
        warn!(path = %path, "Config file not found, using defaults");
        GatewayConfig::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(host) = std::env::var("RELAY_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("RELAY_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %port, "Ignoring invalid RELAY_PORT"),
        }
    }
    if let Ok(url) = std::env::var("RELAY_REDIS_URL") {
        config.rate_limit.redis_url = Some(url);
        config.rate_limit.store = RateLimitStoreKind::Redis;
    }
}
