//! Catalog entry value types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{ProductId, ValidationError};
use crate::domain::payment::Money;

/// Kind of digital product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Course,
    Mentorship,
    Subscription,
    Strategy,
    Club,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Course => "course",
            ProductType::Mentorship => "mentorship",
            ProductType::Subscription => "subscription",
            ProductType::Strategy => "strategy",
            ProductType::Club => "club",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "course" => Ok(ProductType::Course),
            "mentorship" => Ok(ProductType::Mentorship),
            "subscription" => Ok(ProductType::Subscription),
            "strategy" => Ok(ProductType::Strategy),
            "club" => Ok(ProductType::Club),
            other => Err(ValidationError::invalid_format(
                "product_type",
                format!("unknown product type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurrence of a recurring product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl BillingPeriod {
    /// Length of the period in months.
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Quarterly => 3,
            BillingPeriod::Semiannual => 6,
            BillingPeriod::Annual => 12,
        }
    }
}

/// Trusted reference data for one purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub name: String,
    pub product_type: ProductType,

    /// Canonical price, always in the catalog's base currency.
    pub price: Money,

    /// `None` for one-off purchases.
    pub billing_period: Option<BillingPeriod>,
}

impl CatalogEntry {
    pub fn is_recurring(&self) -> bool {
        self.billing_period.is_some()
    }
}
