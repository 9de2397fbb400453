//! Client-supplied idempotency keys.

use std::fmt;
use uuid::Uuid;

use super::PaymentError;

/// A validated `Idempotency-Key` header value.
///
/// Must be a UUID. The same key is forwarded to the provider on the single
/// retry so a provider-side order is never created twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Parses a header value, rejecting anything that is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| PaymentError::InvalidIdempotencyKey(raw.to_string()))
    }

    /// Parses an optional header value.
    pub fn from_header(raw: Option<&str>) -> Result<Self, PaymentError> {
        match raw {
            Some(value) if !value.trim().is_empty() => Self::parse(value),
            _ => Err(PaymentError::MissingIdempotencyKey),
        }
    }

    /// Mints a key for server-initiated calls (sweeper, webhook follow-ups).
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hyphenated_uuid() {
        let key = IdempotencyKey::parse("6f1c2f0e-4a0b-4f0e-9d6a-2b7f0c7e9a11").unwrap();
        assert_eq!(key.to_string(), "6f1c2f0e-4a0b-4f0e-9d6a-2b7f0c7e9a11");
    }

    #[test]
    fn rejects_non_uuid_values() {
        let err = IdempotencyKey::parse("K1").unwrap_err();
        assert_eq!(err, PaymentError::InvalidIdempotencyKey("K1".to_string()));
    }

    #[test]
    fn missing_or_blank_header_is_its_own_error() {
        assert_eq!(
            IdempotencyKey::from_header(None).unwrap_err(),
            PaymentError::MissingIdempotencyKey
        );
        assert_eq!(
            IdempotencyKey::from_header(Some("  ")).unwrap_err(),
            PaymentError::MissingIdempotencyKey
        );
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(IdempotencyKey::generate(), IdempotencyKey::generate());
    }
}
