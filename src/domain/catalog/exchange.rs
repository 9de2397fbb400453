//! Static currency conversion from the catalog base currency.
//!
//! Rates are stored as fixed-point integers with four decimal places so that
//! conversion never touches floating point: `converted_minor =
//! round(base_minor * rate_e4 / 10_000)`, rounding half away from zero.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::CatalogError;
use crate::domain::foundation::ValidationError;
use crate::domain::payment::{Currency, Money};

const RATE_SCALE: i64 = 10_000;

/// Conversion table keyed by target currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRates {
    base: Currency,
    rates_e4: HashMap<Currency, i64>,
}

static STANDARD_RATES: Lazy<ExchangeRates> = Lazy::new(|| {
    ExchangeRates::new(
        Currency::Eur,
        [
            (Currency::Usd, 10_900),
            (Currency::Gbp, 8_600),
            (Currency::Mxn, 185_000),
            (Currency::Brl, 54_000),
            (Currency::Ars, 9_000_000),
            (Currency::Cop, 43_000_000),
        ],
    )
});

impl ExchangeRates {
    /// Creates a table. The base currency always converts at 1.0000.
    pub fn new(base: Currency, rates_e4: impl IntoIterator<Item = (Currency, i64)>) -> Self {
        let mut rates: HashMap<Currency, i64> = rates_e4.into_iter().collect();
        rates.insert(base, RATE_SCALE);
        Self {
            base,
            rates_e4: rates,
        }
    }

    /// Built-in EUR table.
    pub fn standard() -> Self {
        STANDARD_RATES.clone()
    }

    /// Parses overrides of the form `USD=1.09,GBP=0.86` on top of this table.
    pub fn with_overrides(mut self, spec: &str) -> Result<Self, ValidationError> {
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (code, rate) = pair.split_once('=').ok_or_else(|| {
                ValidationError::invalid_format("exchange_rates", format!("'{}' is not CODE=RATE", pair))
            })?;
            let currency: Currency = code.parse()?;
            if currency == self.base {
                continue;
            }
            self.rates_e4.insert(currency, parse_rate_e4(rate)?);
        }
        Ok(self)
    }

    pub fn base(&self) -> Currency {
        self.base
    }

    pub fn supports(&self, currency: Currency) -> bool {
        self.rates_e4.contains_key(&currency)
    }

    /// Converts a base-currency amount into `target`.
    pub fn convert(&self, amount: Money, target: Currency) -> Result<Money, CatalogError> {
        if amount.currency() == target {
            return Ok(amount);
        }
        if amount.currency() != self.base {
            return Err(CatalogError::UnsupportedCurrency(amount.currency().to_string()));
        }
        let rate = self
            .rates_e4
            .get(&target)
            .copied()
            .ok_or_else(|| CatalogError::UnsupportedCurrency(target.to_string()))?;

        let scaled = i128::from(amount.amount_minor()) * i128::from(rate);
        let rounded = (scaled + i128::from(RATE_SCALE / 2)) / i128::from(RATE_SCALE);
        let minor = i64::try_from(rounded)
            .map_err(|_| CatalogError::UnsupportedCurrency(target.to_string()))?;

        Money::new(minor, target).map_err(|_| CatalogError::UnsupportedCurrency(target.to_string()))
    }
}

/// Parses a decimal rate such as `1.09` or `4300` into fixed-point e4.
fn parse_rate_e4(value: &str) -> Result<i64, ValidationError> {
    let value = value.trim();
    let invalid = || ValidationError::invalid_format("exchange_rates", format!("'{}' is not a rate", value));

    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() || frac.len() > 4 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac_padded = format!("{:0<4}", frac);
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        frac_padded.parse().map_err(|_| invalid())?
    };
    let rate = whole
        .checked_mul(RATE_SCALE)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)?;
    if rate <= 0 {
        return Err(invalid());
    }
    Ok(rate)
}
