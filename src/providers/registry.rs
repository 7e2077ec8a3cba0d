//! Name-to-provider mapping shared between the startup path and request
//! worker tasks.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

use super::{Provider, ProviderError};

/// Process-wide provider registry.
///
/// Constructed once at startup and passed by reference to the router and
/// request pipeline; writes only happen during startup registration, so
/// the lock exists for torn-read safety rather than throughput.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a provider under its own name. Registering a second provider
    /// with the same name overwrites the first.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    /// Names of all registered providers, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Look up `name` and forward the command to it. Provider errors are
    /// returned unchanged so callers can inspect them.
    pub async fn execute(
        &self,
        name: &str,
        command: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        let provider = self.get(name)?;
        provider.execute(command, params).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
