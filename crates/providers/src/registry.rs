//! Provider registry — resolves a turn's requested `(provider, model)` pair
//! to a live [`Provider`] instance (spec.md §4.1 "model/provider selection").
//!
//! Grounded on the teacher's `ProviderRegistry`
//! (`crates/providers/src/registry.rs`): a name-keyed map plus a fallback to
//! configured defaults when the caller doesn't specify one. The teacher also
//! builds adapters from config and records per-adapter init failures; this
//! engine takes already-constructed [`Provider`]s (there is nothing to fail
//! to initialize once real adapters are out of scope), so `init_errors` is
//! dropped and `register` replaces `from_config`.

use std::collections::HashMap;
use std::sync::Arc;

use turnengine_domain::error::{Error, Result};

use crate::traits::Provider;

/// Holds all configured providers and the default provider/model used when
/// a turn request doesn't specify one explicitly.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
    default_model: String,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
            default_model: default_model.into(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.provider_id().to_string();
        self.providers.insert(id, provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a turn's requested provider/model against configured
    /// defaults, returning the live provider plus the model name to send
    /// (spec.md §4.1: "an absent `provider` or `model` in the request falls
    /// back to the service's configured default").
    pub fn resolve(
        &self,
        requested_provider: Option<&str>,
        requested_model: Option<&str>,
    ) -> Result<(Arc<dyn Provider>, String)> {
        let provider_id = requested_provider.unwrap_or(&self.default_provider);
        let model = requested_model.unwrap_or(&self.default_model).to_string();

        let provider = self.providers.get(provider_id).ok_or_else(|| {
            Error::validation(format!("unknown provider '{provider_id}'"))
        })?;

        if !provider.supports_model(&model) {
            return Err(Error::validation(format!(
                "provider '{provider_id}' does not support model '{model}'"
            )));
        }

        Ok((provider.clone(), model))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn resolves_to_configured_default_when_unspecified() {
        let mut registry = ProviderRegistry::new("mock", "mock-small");
        registry.register(Arc::new(MockProvider::new("mock", vec!["mock-small"])));

        let (provider, model) = registry.resolve(None, None).unwrap();
        assert_eq!(provider.provider_id(), "mock");
        assert_eq!(model, "mock-small");
    }

    #[test]
    fn unknown_provider_is_a_validation_error() {
        let registry = ProviderRegistry::new("mock", "mock-small");
        assert!(registry.resolve(Some("nonexistent"), None).is_err());
    }

    #[test]
    fn unsupported_model_is_a_validation_error() {
        let mut registry = ProviderRegistry::new("mock", "mock-small");
        registry.register(Arc::new(MockProvider::new("mock", vec!["mock-small"])));
        assert!(registry.resolve(None, Some("mock-huge")).is_err());
    }
}
