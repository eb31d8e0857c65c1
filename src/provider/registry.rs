use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use super::Provider;

type Factory = Box<dyn Fn(&str) -> Arc<dyn Provider> + Send + Sync>;

/// Process-wide `provider_name -> factory(token) -> driver` mapping,
/// populated once at startup by driver modules registering themselves
/// (§4.2). Registration is mutex-protected; lookups are cheap after init.
pub struct ProviderRegistry {
    factories: Mutex<HashMap<String, Factory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("digitalocean", |token| {
            Arc::new(super::digitalocean::DigitalOceanProvider::new(token.to_string())) as Arc<dyn Provider>
        });
        registry.register("flyio", |token| {
            Arc::new(super::flyio::FlyIoProvider::new(token.to_string())) as Arc<dyn Provider>
        });
        registry
    }

    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&str) -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        self.factories.lock().unwrap().insert(name.to_string(), Box::new(factory));
    }

    pub fn get(&self, name: &str, token: &str) -> Result<Arc<dyn Provider>> {
        let factories = self.factories.lock().unwrap();
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        Ok(factory(token))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_an_error() {
        let registry = ProviderRegistry::with_defaults();
        let err = registry.get("nonexistent", "token").unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(_)));
    }

    #[test]
    fn known_providers_resolve() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.get("digitalocean", "token").is_ok());
        assert!(registry.get("flyio", "token").is_ok());
    }

    #[test]
    fn names_lists_registered_providers_sorted() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["digitalocean", "flyio"]);
    }
}
