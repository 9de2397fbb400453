//! Mock token verifier for testing.
//!
//! Maps opaque test tokens straight to users so tests never mint JWTs.
//!
//! # Example
//!
//! ```ignore
//! let verifier = MockAccessTokenVerifier::new()
//!     .with_customer("buyer-token", "user-1")
//!     .with_admin("ops-token", "ops-1");
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser, Role, UserId};
use crate::ports::AccessTokenVerifier;

/// Mock access token verifier.
///
/// Tokens not in the map return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockAccessTokenVerifier {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    /// Returned for every verification when set.
    force_error: RwLock<Option<AuthError>>,
}

impl MockAccessTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.add_token(token, user);
        self
    }

    /// Registers a customer token. Invalid user ids are skipped, so the token
    /// later verifies as `InvalidToken`.
    pub fn with_customer(self, token: impl Into<String>, user_id: &str) -> Self {
        self.with_role(token, user_id, Role::Customer)
    }

    /// Registers an admin token.
    pub fn with_admin(self, token: impl Into<String>, user_id: &str) -> Self {
        self.with_role(token, user_id, Role::Admin)
    }

    fn with_role(self, token: impl Into<String>, user_id: &str, role: Role) -> Self {
        if let Ok(id) = UserId::new(user_id) {
            let email = Some(format!("{}@test.example.com", user_id));
            self.add_token(token, AuthenticatedUser::new(id, email, role));
        }
        self
    }

    pub fn with_error(self, error: AuthError) -> Self {
        *self
            .force_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    pub fn add_token(&self, token: impl Into<String>, user: AuthenticatedUser) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
    }
}

#[async_trait]
impl AccessTokenVerifier for MockAccessTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_returns_user() {
        let verifier = MockAccessTokenVerifier::new().with_customer("t1", "user-1");
        let user = verifier.verify("t1").await.unwrap();
        assert_eq!(user.id.as_str(), "user-1");
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let verifier = MockAccessTokenVerifier::new();
        assert_eq!(verifier.verify("nope").await.unwrap_err(), AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let verifier = MockAccessTokenVerifier::new()
            .with_admin("ops", "ops-1")
            .with_error(AuthError::service_unavailable("down"));
        assert!(matches!(
            verifier.verify("ops").await,
            Err(AuthError::ServiceUnavailable(_))
        ));
    }
}
