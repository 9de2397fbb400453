//! Access token verification port.
//!
//! Identity is issued by the external auth service. This service only checks
//! tokens and maps their claims onto an `AuthenticatedUser`.
//!
//! Implementations must validate signature, expiry, issuer and audience.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

#[async_trait]
pub trait AccessTokenVerifier: Send + Sync {
    /// Verify a bearer token (without the `Bearer ` prefix).
    ///
    /// * `Err(AuthError::InvalidToken)` - malformed or bad signature
    /// * `Err(AuthError::TokenExpired)` - valid signature but expired
    /// * `Err(AuthError::ServiceUnavailable)` - verifier misconfigured or unreachable
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}
