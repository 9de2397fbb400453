use thiserror::Error;

use crate::domain::payment::Money;

/// Errors raised while resolving or validating a catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Price mismatch: expected {expected}, got {claimed}")]
    PriceMismatch { expected: Money, claimed: Money },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}
