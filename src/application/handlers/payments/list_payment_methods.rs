//! ListPaymentMethodsHandler - Query handler for the checkout method picker.

use crate::adapters::providers::ProviderRegistry;
use crate::domain::payment::ProviderKind;

#[derive(Debug, Clone, Default)]
pub struct ListPaymentMethodsQuery {
    /// ISO 3166 alpha-2 country of the buyer, if known.
    pub country: Option<String>,
}

pub type ListPaymentMethodsResult = Vec<ProviderKind>;

/// Offers only providers that operate in the country and are configured here.
pub struct ListPaymentMethodsHandler {
    providers: ProviderRegistry,
}

impl ListPaymentMethodsHandler {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    pub fn handle(&self, query: ListPaymentMethodsQuery) -> ListPaymentMethodsResult {
        self.providers.available_for_country(query.country.as_deref())
    }
}
