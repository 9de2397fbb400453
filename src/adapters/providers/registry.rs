//! Provider registry - resolves a `ProviderKind` to its adapter.
//!
//! Built once at startup. Handlers never match on the kind themselves.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::payment::{PaymentError, ProviderKind};
use crate::ports::PaymentProvider;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own kind, replacing any previous adapter.
    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Adapter for `kind`; `UnknownProvider` when it is not configured.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownProvider(kind.to_string()))
    }

    /// Parse a path segment and resolve it.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.get(name.parse()?)
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Configured providers offered in `country`, in display order.
    pub fn available_for_country(&self, country: Option<&str>) -> Vec<ProviderKind> {
        ProviderKind::available_for_country(country)
            .into_iter()
            .filter(|k| self.is_configured(*k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
