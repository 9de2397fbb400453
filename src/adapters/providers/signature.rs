//! Timestamped HMAC-SHA256 webhook signatures.
//!
//! Shared by the card processor and the regional rails. The signature header
//! has the form:
//!
//! ```text
//! t=<unix seconds>,v1=<hex hmac-sha256 of "<t>.<raw body>">
//! ```
//!
//! # Security
//!
//! - The MAC is computed over the raw request bytes, never a re-serialization
//! - Comparison is constant time
//! - Events older than 5 minutes (or more than 60s in the future) are rejected

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

use crate::domain::payment::{PaymentError, ProviderKind};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
pub const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
pub const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the sender signed at.
    pub timestamp: i64,

    /// HMAC-SHA256 signature bytes.
    pub v1_signature: Vec<u8>,
}

/// Errors that can occur when parsing a signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    MissingHeader,
    MissingTimestamp,
    MissingV1Signature,
    InvalidTimestamp,
    InvalidSignatureFormat,
}

impl fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp in signature header"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in signature header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp in signature header"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

impl SignatureHeader {
    /// Parse `t=<timestamp>,v1=<signature>`. Unknown fields are ignored.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex::decode(value.trim())
                            .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signature: v1_signature.ok_or(SignatureParseError::MissingV1Signature)?,
        })
    }
}

fn mac_for(
    provider: ProviderKind,
    secret: &SecretString,
    timestamp: i64,
    payload: &[u8],
) -> Result<Vec<u8>, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| PaymentError::invalid_signature(provider, format!("Bad signing key: {}", e)))?;

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify `header` against `payload` at time `now` (unix seconds).
pub fn verify_timestamped_hmac(
    provider: ProviderKind,
    secret: &SecretString,
    header: &SignatureHeader,
    payload: &[u8],
    now: i64,
) -> Result<(), PaymentError> {
    let Some(age) = now.checked_sub(header.timestamp) else {
        tracing::warn!(
            provider = %provider,
            event_timestamp = header.timestamp,
            "Webhook timestamp out of range"
        );
        return Err(PaymentError::invalid_signature(
            provider,
            "Event timestamp out of range",
        ));
    };

    if age > MAX_TIMESTAMP_AGE_SECS {
        tracing::warn!(
            provider = %provider,
            event_timestamp = header.timestamp,
            current_time = now,
            age_secs = age,
            "Webhook event too old - possible replay attack"
        );
        return Err(PaymentError::invalid_signature(
            provider,
            format!("Event too old ({} seconds)", age),
        ));
    }

    if age < -MAX_FUTURE_TOLERANCE_SECS {
        tracing::warn!(
            provider = %provider,
            event_timestamp = header.timestamp,
            current_time = now,
            "Webhook event from future - clock skew or manipulation"
        );
        return Err(PaymentError::invalid_signature(
            provider,
            "Event timestamp in future",
        ));
    }

    let expected = mac_for(provider, secret, header.timestamp, payload)?;

    if expected.as_slice().ct_eq(&header.v1_signature).unwrap_u8() != 1 {
        tracing::warn!(provider = %provider, "Invalid webhook signature");
        return Err(PaymentError::invalid_signature(provider, "Invalid signature"));
    }

    Ok(())
}

/// Build a signature header value for `payload`, as a sender would.
///
/// Used by the sandbox tooling and tests to produce deliverable callbacks.
pub fn sign_payload(secret: &SecretString, timestamp: i64, payload: &[u8]) -> String {
    // Key length is unrestricted for HMAC, so the Card kind here is only a label.
    let mac = mac_for(ProviderKind::Card, secret, timestamp, payload).unwrap_or_default();
    format!("t={},v1={}", timestamp, hex::encode(mac))
}
