//! Tolerance check between a claimed amount and the catalog price.

use super::CatalogError;
use crate::domain::payment::Money;

/// Default tolerance: 1% (100 basis points).
pub const DEFAULT_TOLERANCE_BPS: i64 = 100;

/// Accepts a claimed amount when it lies within a fixed percentage of the
/// canonical amount, absorbing currency-conversion rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceValidator {
    tolerance_bps: i64,
}

impl Default for PriceValidator {
    fn default() -> Self {
        Self {
            tolerance_bps: DEFAULT_TOLERANCE_BPS,
        }
    }
}

impl PriceValidator {
    pub fn with_tolerance_bps(tolerance_bps: i64) -> Self {
        Self {
            tolerance_bps: tolerance_bps.max(0),
        }
    }

    /// True if `claimed` is the same currency and within tolerance of `canonical`.
    pub fn validate_amount(&self, claimed: Money, canonical: Money) -> bool {
        if claimed.currency() != canonical.currency() {
            return false;
        }
        let diff = i128::from((claimed.amount_minor() - canonical.amount_minor()).abs());
        let allowed = i128::from(canonical.amount_minor()) * i128::from(self.tolerance_bps);
        diff * 10_000 <= allowed
    }

    /// Like `validate_amount`, but returns `PriceMismatch` on failure.
    pub fn check(&self, claimed: Money, canonical: Money) -> Result<(), CatalogError> {
        if self.validate_amount(claimed, canonical) {
            Ok(())
        } else {
            Err(CatalogError::PriceMismatch {
                expected: canonical,
                claimed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Currency;

    fn eur(minor: i64) -> Money {
        Money::new(minor, Currency::Eur).unwrap()
    }

    #[test]
    fn exact_amount_is_accepted() {
        assert!(PriceValidator::default().validate_amount(eur(10_000), eur(10_000)));
    }

    #[test]
    fn one_percent_either_side_is_accepted() {
        let v = PriceValidator::default();
        assert!(v.validate_amount(eur(10_100), eur(10_000)));
        assert!(v.validate_amount(eur(9_900), eur(10_000)));
    }

    #[test]
    fn one_and_a_half_percent_is_rejected() {
        let v = PriceValidator::default();
        assert!(!v.validate_amount(eur(10_150), eur(10_000)));
        assert!(!v.validate_amount(eur(9_850), eur(10_000)));
    }

    #[test]
    fn different_currency_is_rejected() {
        let usd = Money::new(10_000, Currency::Usd).unwrap();
        assert!(!PriceValidator::default().validate_amount(usd, eur(10_000)));
    }

    #[test]
    fn check_reports_expected_and_claimed() {
        let err = PriceValidator::default().check(eur(9_000), eur(10_000)).unwrap_err();
        assert_eq!(
            err,
            CatalogError::PriceMismatch {
                expected: eur(10_000),
                claimed: eur(9_000),
            }
        );
    }

    #[test]
    fn zero_tolerance_requires_exact_match() {
        let v = PriceValidator::with_tolerance_bps(0);
        assert!(v.validate_amount(eur(10_000), eur(10_000)));
        assert!(!v.validate_amount(eur(10_001), eur(10_000)));
    }
}
