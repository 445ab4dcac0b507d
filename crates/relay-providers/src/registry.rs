//! Provider registry.
//!
//! The single place provider names resolve to adapters. The orchestrator
//! never branches on a provider name outside this lookup.

use dashmap::DashMap;
use relay_core::{GatewayError, ProviderAdapter};
use std::sync::Arc;

/// Registry mapping provider names to adapters
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name
    ///
    /// # Errors
    /// Returns an error when the name is already taken.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> Result<(), GatewayError> {
        let name = adapter.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(GatewayError::configuration(format!(
                "provider {name} already registered"
            )));
        }
        self.providers.insert(name, adapter);
        Ok(())
    }

    /// Look up an adapter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Registered provider names
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::{ChatRequest, ChatResponse, ChunkStream};

    struct StubAdapter(&'static str);

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        fn name(&self) -> &str {
            self.0
        }

        async fn send(&self, _request: &ChatRequest) -> Result<ChatResponse, GatewayError> {
            Ok(ChatResponse::single("id", "m", "ok"))
        }

        async fn send_stream(&self, _request: &ChatRequest) -> Result<ChunkStream, GatewayError> {
            Err(GatewayError::internal("not streamable"))
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubAdapter("together"))).unwrap();
        assert!(registry.get("together").is_some());
        assert!(registry.get("fireworks").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubAdapter("together"))).unwrap();
        assert!(registry.register(Arc::new(StubAdapter("together"))).is_err());
    }
}
