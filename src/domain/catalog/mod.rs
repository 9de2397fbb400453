//! Catalog module - trusted prices and the checks built on them.
//!
//! Everything here is pure: no I/O, no clock, no network.

mod catalog;
mod errors;
mod exchange;
mod price_validator;
mod product;

pub use catalog::Catalog;
pub use errors::CatalogError;
pub use exchange::ExchangeRates;
pub use price_validator::{PriceValidator, DEFAULT_TOLERANCE_BPS};
pub use product::{BillingPeriod, CatalogEntry, ProductType};
