//! Model/provider resolution.
//!
//! Given a declared model id and an optional explicit provider, decide
//! which provider to try first and what the provider-specific model id is.
//! Detection order:
//!
//! 1. normalize provider aliases
//! 2. a vendor-encoded override in the model id wins over the declared
//!    provider (and is logged)
//! 3. lexical detection from known vendor prefixes/substrings
//! 4. catalog probe: first eligible provider whose cached catalog lists
//!    the transformed id
//! 5. the universal fallback

use crate::catalog::CatalogCache;
use crate::failover::{FALLBACK_PROVIDER_PRIORITY, UNIVERSAL_FALLBACK};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of provider resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Provider to try first
    pub provider: String,
    /// Model id rewritten for that provider
    pub provider_model_id: String,
}

/// Normalize legacy provider aliases to canonical names
#[must_use]
pub fn normalize_provider_alias(provider: &str) -> String {
    let lowered = provider.to_ascii_lowercase();
    match lowered.as_str() {
        "hug" => "huggingface".to_string(),
        "vercel" => "vercel-ai-gateway".to_string(),
        _ => lowered,
    }
}

/// Detect the provider from the model id's lexical pattern.
///
/// Returns `None` when nothing matches; the caller then falls back to the
/// catalog probe and finally the universal fallback.
#[must_use]
pub fn detect_provider_from_model_id(model_id: &str) -> Option<&'static str> {
    let lowered = model_id.to_ascii_lowercase();

    // Already in a provider-native format
    if lowered.starts_with("accounts/fireworks/models/") {
        return Some("fireworks");
    }

    // OpenRouter variant suffixes like ":free" / ":extended"
    if let Some((_, suffix)) = model_id.split_once(':') {
        if model_id.contains('/') && matches!(suffix, "free" | "extended" | "exacto") {
            return Some("openrouter");
        }
    }

    // Bare Gemini ids go to Vertex; org-prefixed google/ ids stay with
    // OpenRouter (its catalog carries them with variant suffixes)
    if !model_id.contains('/')
        && ["gemini-2.5", "gemini-2.0", "gemini-1.5", "gemini-1.0"]
            .iter()
            .any(|p| lowered.starts_with(p))
    {
        return Some("google-vertex");
    }

    // Bare vendor families served through the universal aggregator
    if !model_id.contains('/') && (lowered.starts_with("claude-") || lowered.starts_with("gpt-")) {
        return Some("openrouter");
    }

    if let Some((org, _rest)) = model_id.split_once('/') {
        match org.to_ascii_lowercase().as_str() {
            "openrouter" => return Some("openrouter"),
            "anannas" => return Some("anannas"),
            "anthropic" | "openai" => return Some("openrouter"),
            "google" if lowered.contains("gemini") => return Some("google-vertex"),
            "deepseek-ai" => return Some("fireworks"),
            _ => {}
        }
    }

    None
}

/// Rewrite a model id into the provider-specific form.
///
/// Idempotent per provider: applying the transform twice yields the same
/// string as applying it once.
#[must_use]
pub fn transform_model_id(model_id: &str, provider: &str) -> String {
    match provider {
        "openrouter" => {
            // "openrouter/auto" keeps its prefix; it is the router model
            if model_id == "openrouter/auto" {
                model_id.to_string()
            } else {
                model_id
                    .strip_prefix("openrouter/")
                    .unwrap_or(model_id)
                    .to_string()
            }
        }
        "fireworks" => {
            if model_id.starts_with("accounts/fireworks/models/") {
                model_id.to_string()
            } else if model_id.contains('/') {
                // org-prefixed ids keep only the model segment
                let name = model_id.rsplit('/').next().unwrap_or(model_id);
                format!("accounts/fireworks/models/{name}")
            } else {
                format!("accounts/fireworks/models/{model_id}")
            }
        }
        "google-vertex" => model_id
            .strip_prefix("google/")
            .unwrap_or(model_id)
            .to_string(),
        "anannas" => model_id
            .strip_prefix("anannas/")
            .unwrap_or(model_id)
            .to_string(),
        _ => model_id.to_string(),
    }
}

/// Model/provider resolver with an injected catalog cache
pub struct Resolver {
    catalogs: Arc<CatalogCache>,
}

impl Resolver {
    /// Create a resolver over the given catalog cache
    #[must_use]
    pub fn new(catalogs: Arc<CatalogCache>) -> Self {
        Self { catalogs }
    }

    /// Resolve the first-choice provider and provider-specific model id
    #[must_use]
    pub fn resolve(&self, model_id: &str, declared_provider: Option<&str>) -> Resolution {
        let declared = declared_provider
            .filter(|p| !p.is_empty())
            .map(normalize_provider_alias);

        let detected = detect_provider_from_model_id(model_id).map(normalize_provider_alias);

        let provider = match (declared, detected) {
            (Some(declared), Some(detected)) => {
                if declared == detected {
                    declared
                } else {
                    // A vendor-encoded id wins over the declared provider
                    info!(
                        model = %model_id,
                        declared = %declared,
                        detected = %detected,
                        "Provider override applied from model id"
                    );
                    detected
                }
            }
            (Some(declared), None) => declared,
            (None, Some(detected)) => {
                debug!(model = %model_id, provider = %detected, "Auto-detected provider");
                detected
            }
            (None, None) => self.probe_catalogs(model_id).unwrap_or_else(|| {
                debug!(model = %model_id, "No provider detected, using universal fallback");
                UNIVERSAL_FALLBACK.to_string()
            }),
        };

        let provider_model_id = transform_model_id(model_id, &provider);
        Resolution {
            provider,
            provider_model_id,
        }
    }

    /// First eligible provider whose cached catalog lists the transformed id
    fn probe_catalogs(&self, model_id: &str) -> Option<String> {
        for candidate in FALLBACK_PROVIDER_PRIORITY {
            let transformed = transform_model_id(model_id, candidate);
            if self.catalogs.contains(candidate, &transformed) {
                debug!(
                    model = %model_id,
                    provider = %candidate,
                    transformed = %transformed,
                    "Catalog probe matched"
                );
                return Some(candidate.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(CatalogCache::new(Duration::from_secs(60))))
    }

    #[test]
    fn test_detect_claude_goes_to_openrouter() {
        assert_eq!(
            detect_provider_from_model_id("claude-sonnet-4-5-20250929"),
            Some("openrouter")
        );
        assert_eq!(
            detect_provider_from_model_id("anthropic/claude-sonnet-4-5"),
            Some("openrouter")
        );
    }

    #[test]
    fn test_detect_gemini_goes_to_vertex() {
        assert_eq!(detect_provider_from_model_id("gemini-2.0-flash"), Some("google-vertex"));
        assert_eq!(
            detect_provider_from_model_id("google/gemini-1.5-pro"),
            Some("google-vertex")
        );
    }

    #[test]
    fn test_detect_colon_suffix_goes_to_openrouter() {
        assert_eq!(
            detect_provider_from_model_id("z-ai/glm-4.6:free"),
            Some("openrouter")
        );
    }

    #[test]
    fn test_detect_fireworks_native_format() {
        assert_eq!(
            detect_provider_from_model_id("accounts/fireworks/models/llama-v3-70b"),
            Some("fireworks")
        );
        assert_eq!(
            detect_provider_from_model_id("deepseek-ai/DeepSeek-V3"),
            Some("fireworks")
        );
    }

    #[test]
    fn test_detect_unknown_is_none() {
        assert_eq!(detect_provider_from_model_id("mystery-model-9000"), None);
    }

    #[test]
    fn test_transform_idempotent() {
        for (model, provider) in [
            ("openrouter/auto", "openrouter"),
            ("openrouter/meta-llama/llama-3-70b", "openrouter"),
            ("llama-v3-70b", "fireworks"),
            ("deepseek-ai/DeepSeek-V3", "fireworks"),
            ("google/gemini-1.5-pro", "google-vertex"),
            ("meta-llama/Llama-3-70b", "together"),
        ] {
            let once = transform_model_id(model, provider);
            let twice = transform_model_id(&once, provider);
            assert_eq!(once, twice, "transform not idempotent for {model} on {provider}");
        }
    }

    #[test]
    fn test_transform_openrouter_strips_prefix() {
        assert_eq!(
            transform_model_id("openrouter/meta-llama/llama-3-70b", "openrouter"),
            "meta-llama/llama-3-70b"
        );
        assert_eq!(transform_model_id("openrouter/auto", "openrouter"), "openrouter/auto");
    }

    #[test]
    fn test_transform_fireworks_adds_namespace() {
        assert_eq!(
            transform_model_id("llama-v3-70b", "fireworks"),
            "accounts/fireworks/models/llama-v3-70b"
        );
    }

    #[test]
    fn test_resolve_declared_provider_with_alias() {
        let resolution = resolver().resolve("some-model", Some("hug"));
        assert_eq!(resolution.provider, "huggingface");
        assert_eq!(resolution.provider_model_id, "some-model");
    }

    #[test]
    fn test_resolve_override_beats_declared() {
        let resolution = resolver().resolve("claude-sonnet-4-5-20250929", Some("together"));
        assert_eq!(resolution.provider, "openrouter");
    }

    #[test]
    fn test_resolve_catalog_probe() {
        let catalogs = Arc::new(CatalogCache::new(Duration::from_secs(60)));
        catalogs.set_models("featherless", vec!["obscure/model-7b".to_string()]);
        let resolver = Resolver::new(catalogs);
        let resolution = resolver.resolve("obscure/model-7b", None);
        assert_eq!(resolution.provider, "featherless");
    }

    #[test]
    fn test_resolve_defaults_to_universal_fallback() {
        let resolution = resolver().resolve("mystery-model-9000", None);
        assert_eq!(resolution.provider, UNIVERSAL_FALLBACK);
    }
}
