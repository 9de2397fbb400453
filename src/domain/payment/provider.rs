//! Payment provider identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::PaymentError;

/// Closed set of payment providers.
///
/// Resolved once at the HTTP boundary; everything downstream dispatches on
/// this enum (or on the `PaymentProvider` bound to it) instead of strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Card processor (Stripe-compatible API).
    Card,
    #[serde(rename = "paypal")]
    PayPal,
    /// Brazilian instant payments.
    Pix,
    /// SEPA bank transfer.
    Sepa,
    #[serde(rename = "mercadopago")]
    MercadoPago,
}

const MERCADOPAGO_COUNTRIES: [&str; 6] = ["AR", "MX", "CO", "CL", "PE", "UY"];
const PIX_COUNTRIES: [&str; 1] = ["BR"];
const SEPA_COUNTRIES: [&str; 7] = ["ES", "FR", "DE", "IT", "PT", "NL", "BE"];

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Card,
        ProviderKind::PayPal,
        ProviderKind::Pix,
        ProviderKind::Sepa,
        ProviderKind::MercadoPago,
    ];

    /// Stable lowercase name used in URLs and the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Card => "card",
            ProviderKind::PayPal => "paypal",
            ProviderKind::Pix => "pix",
            ProviderKind::Sepa => "sepa",
            ProviderKind::MercadoPago => "mercadopago",
        }
    }

    /// True for the regional rails that only have stubbed order creation.
    pub fn is_regional(&self) -> bool {
        matches!(
            self,
            ProviderKind::Pix | ProviderKind::Sepa | ProviderKind::MercadoPago
        )
    }

    /// Providers offered to a buyer in the given ISO 3166 country.
    ///
    /// Card and PayPal are offered everywhere; regional rails only where they operate.
    pub fn available_for_country(country: Option<&str>) -> Vec<ProviderKind> {
        let mut methods = vec![ProviderKind::Card, ProviderKind::PayPal];
        let Some(country) = country.map(|c| c.trim().to_ascii_uppercase()) else {
            return methods;
        };
        let country = country.as_str();

        if MERCADOPAGO_COUNTRIES.contains(&country) {
            methods.push(ProviderKind::MercadoPago);
        }
        if PIX_COUNTRIES.contains(&country) {
            methods.push(ProviderKind::Pix);
        }
        if SEPA_COUNTRIES.contains(&country) {
            methods.push(ProviderKind::Sepa);
        }
        methods
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" | "stripe" => Ok(ProviderKind::Card),
            "paypal" => Ok(ProviderKind::PayPal),
            "pix" => Ok(ProviderKind::Pix),
            "sepa" => Ok(ProviderKind::Sepa),
            "mercadopago" => Ok(ProviderKind::MercadoPago),
            _ => Err(PaymentError::UnknownProvider(s.to_string())),
        }
    }
}
