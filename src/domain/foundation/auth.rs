//! Caller identity as seen by the payment service.
//!
//! Tokens are issued by the external auth service. We only verify them
//! (see `ports::AccessTokenVerifier`) and carry the result through the
//! request as an `AuthenticatedUser`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UserId;

/// Role claim carried by the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular purchaser.
    #[default]
    Customer,
    /// Back-office operator; may issue refunds and read ledger stats.
    Admin,
}

impl Role {
    /// Parses a role claim, treating anything unrecognized as `Customer`.
    pub fn from_claim(claim: &str) -> Self {
        if claim.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Customer
        }
    }
}

/// Authenticated caller extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: Option<String>,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn new(id: UserId, email: Option<String>, role: Role) -> Self {
        Self { id, email, role }
    }

    /// Shorthand for a customer without email claim; handy in tests.
    pub fn customer(id: UserId) -> Self {
        Self::new(id, None, Role::Customer)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Authentication errors that can occur during token verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is malformed or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Token is valid but the caller lacks the required role.
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The verifier could not complete (bad configuration, key fetch failure).
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this error indicates the caller should re-authenticate.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, AuthError::InvalidToken | AuthError::TokenExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_from_claim_is_case_insensitive_for_admin() {
        assert_eq!(Role::from_claim("admin"), Role::Admin);
        assert_eq!(Role::from_claim("ADMIN"), Role::Admin);
        assert_eq!(Role::from_claim("editor"), Role::Customer);
    }

    #[test]
    fn customer_is_not_admin() {
        let user = AuthenticatedUser::customer(UserId::new("user-1").unwrap());
        assert!(!user.is_admin());
    }

    #[test]
    fn admin_role_is_admin() {
        let user = AuthenticatedUser::new(UserId::new("ops-1").unwrap(), None, Role::Admin);
        assert!(user.is_admin());
    }

    #[test]
    fn auth_error_requires_reauthentication_for_token_errors() {
        assert!(AuthError::InvalidToken.requires_reauthentication());
        assert!(AuthError::TokenExpired.requires_reauthentication());
        assert!(!AuthError::InsufficientPermissions.requires_reauthentication());
        assert!(!AuthError::service_unavailable("down").requires_reauthentication());
    }
}
