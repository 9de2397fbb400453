//! Authoritative product catalog.
//!
//! Prices are held in a single base currency (EUR). Display prices in other
//! currencies are derived with `ExchangeRates`, never stored.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{BillingPeriod, CatalogEntry, CatalogError, ProductType};
use crate::domain::foundation::{ProductId, ValidationError};
use crate::domain::payment::{Currency, Money};

/// Read-only lookup of trusted catalog entries.
#[derive(Debug, Clone)]
pub struct Catalog {
    base_currency: Currency,
    entries: HashMap<ProductId, CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate ids and entries priced outside
    /// the base currency.
    pub fn new(
        base_currency: Currency,
        entries: impl IntoIterator<Item = CatalogEntry>,
    ) -> Result<Self, ValidationError> {
        let mut map = HashMap::new();
        for entry in entries {
            if entry.price.currency() != base_currency {
                return Err(ValidationError::invalid_format(
                    "price",
                    format!(
                        "{} is priced in {}, catalog base is {}",
                        entry.product_id,
                        entry.price.currency(),
                        base_currency
                    ),
                ));
            }
            let id = entry.product_id.clone();
            if map.insert(id.clone(), entry).is_some() {
                return Err(ValidationError::invalid_format(
                    "product_id",
                    format!("duplicate catalog entry {}", id),
                ));
            }
        }
        Ok(Self {
            base_currency,
            entries: map,
        })
    }

    /// The built-in EUR price list.
    pub fn standard() -> Self {
        STANDARD_CATALOG.clone()
    }

    pub fn base_currency(&self) -> Currency {
        self.base_currency
    }

    pub fn get(&self, product_id: &str) -> Option<&CatalogEntry> {
        let id = ProductId::new(product_id).ok()?;
        self.entries.get(&id)
    }

    /// Resolves a product to its entry, or `NotFound`.
    pub fn lookup(&self, product_id: &str) -> Result<&CatalogEntry, CatalogError> {
        self.get(product_id)
            .ok_or_else(|| CatalogError::NotFound(product_id.to_string()))
    }

    /// Resolves a product id to its canonical price.
    pub fn resolve_price(&self, product_id: &str) -> Result<Money, CatalogError> {
        self.lookup(product_id).map(|entry| entry.price)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry(
    id: &str,
    name: &str,
    product_type: ProductType,
    euros: i64,
    period: Option<BillingPeriod>,
) -> Option<CatalogEntry> {
    Some(CatalogEntry {
        product_id: ProductId::new(id).ok()?,
        name: name.to_string(),
        product_type,
        price: Money::major(euros, Currency::Eur),
        billing_period: period,
    })
}

static STANDARD_CATALOG: Lazy<Catalog> = Lazy::new(|| {
    use BillingPeriod::*;
    use ProductType::*;

    let entries = [
        entry("course-python-trading", "Python for Trading", Course, 299, None),
        entry("course-strategyquant", "StrategyQuant Masterclass", Course, 249, None),
        entry("course-risk-management", "Risk Management", Course, 199, None),
        entry("course-technical-analysis", "Technical Analysis", Course, 399, None),
        entry("course-bundle-3", "3-Course Bundle", Course, 599, None),
        entry("course-42", "Course 42", Course, 100, None),
        entry("mentorship-individual", "Individual Mentorship Session", Mentorship, 70, None),
        entry("mentorship-pack-5", "Mentorship Pack (5 sessions)", Mentorship, 320, None),
        entry("mentorship-premium-club", "Premium Mentorship Club", Mentorship, 400, Some(Monthly)),
        entry("club-strategyquant-monthly", "StrategyQuant Club", Club, 150, Some(Monthly)),
        entry("subscription-total-access", "Total Access", Subscription, 997, Some(Annual)),
        entry("strategy-individual-monthly", "Individual Strategy (Monthly)", Strategy, 50, Some(Monthly)),
        entry("strategy-individual-quarterly", "Individual Strategy (Quarterly)", Strategy, 130, Some(Quarterly)),
        entry("strategy-individual-semiannual", "Individual Strategy (Semiannual)", Strategy, 250, Some(Semiannual)),
        entry("strategy-portfolio-monthly", "Strategy Portfolio (Monthly)", Strategy, 120, Some(Monthly)),
        entry("strategy-portfolio-quarterly", "Strategy Portfolio (Quarterly)", Strategy, 320, Some(Quarterly)),
        entry("strategy-portfolio-semiannual", "Strategy Portfolio (Semiannual)", Strategy, 600, Some(Semiannual)),
        entry("strategy-darwinex-monthly", "Darwinex Strategy (Monthly)", Strategy, 200, Some(Monthly)),
    ];

    let entries: Vec<CatalogEntry> = entries.into_iter().flatten().collect();
    Catalog::new(Currency::Eur, entries).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Standard catalog failed validation");
        Catalog {
            base_currency: Currency::Eur,
            entries: HashMap::new(),
        }
    })
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_fully_populated() {
        assert_eq!(Catalog::standard().len(), 18);
    }

    #[test]
    fn resolves_course_42_at_one_hundred_euros() {
        let price = Catalog::standard().resolve_price("course-42").unwrap();
        assert_eq!(price, Money::major(100, Currency::Eur));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let err = Catalog::standard().resolve_price("course-999").unwrap_err();
        assert_eq!(err, CatalogError::NotFound("course-999".to_string()));
    }

    #[test]
    fn malformed_product_id_is_not_found() {
        assert!(Catalog::standard().resolve_price("Course 42").is_err());
    }

    #[test]
    fn recurring_products_carry_their_period() {
        let catalog = Catalog::standard();
        let club = catalog.lookup("club-strategyquant-monthly").unwrap();
        assert_eq!(club.billing_period, Some(BillingPeriod::Monthly));
        assert!(!catalog.lookup("course-42").unwrap().is_recurring());
    }

    #[test]
    fn new_rejects_duplicates() {
        let e = entry("course-1", "One", ProductType::Course, 10, None).unwrap();
        let result = Catalog::new(Currency::Eur, vec![e.clone(), e]);
        assert!(result.is_err());
    }

    #[test]
    fn new_rejects_foreign_currency_entries() {
        let mut e = entry("course-1", "One", ProductType::Course, 10, None).unwrap();
        e.price = Money::major(10, Currency::Usd);
        assert!(Catalog::new(Currency::Eur, vec![e]).is_err());
    }
}
