//! HMAC-signed JWT adapter for access token verification.
//!
//! The auth service issues HS256 tokens signed with a shared secret. This
//! adapter validates them by:
//!
//! 1. Checking the signature against the configured secret
//! 2. Validating issuer, audience and expiry claims
//! 3. Mapping `sub`, `email` and `role` onto `AuthenticatedUser`

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AuthError, AuthenticatedUser, Role, UserId};
use crate::ports::AccessTokenVerifier;

/// Configuration for the JWT verifier.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,

    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` claim (single value or member of an array).
    pub audience: String,

    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl JwtConfig {
    pub fn new(secret: SecretString, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_secs: 30,
        }
    }
}

/// Claims we read from access tokens.
#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    iss: String,
    #[serde(default)]
    aud: Audience,
    #[allow(dead_code)]
    exp: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Audience can be a single string or array of strings in JWTs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == expected,
            Audience::Multiple(v) => v.iter().any(|s| s == expected),
        }
    }
}

/// Verifies HS256 access tokens issued by the auth service.
pub struct JwtAccessTokenVerifier {
    config: JwtConfig,
    decoding_key: DecodingKey,
}

impl JwtAccessTokenVerifier {
    pub fn new(config: JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.expose_secret().as_bytes());
        Self {
            config,
            decoding_key,
        }
    }

    fn validate_token(&self, token: &str) -> Result<TokenData<AccessClaims>, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Token expired");
                    AuthError::TokenExpired
                }
                ErrorKind::InvalidIssuer => {
                    tracing::warn!(target: "security", "Invalid issuer in token");
                    AuthError::InvalidToken
                }
                ErrorKind::InvalidAudience => {
                    tracing::warn!(target: "security", "Invalid audience in token");
                    AuthError::InvalidToken
                }
                _ => {
                    tracing::warn!(target: "security", error = %e, "Token validation failed");
                    AuthError::InvalidToken
                }
            }
        })
    }
}

#[async_trait]
impl AccessTokenVerifier for JwtAccessTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.validate_token(token)?.claims;

        if !claims.aud.contains(&self.config.audience) {
            tracing::warn!(target: "security", audience = ?claims.aud, "Audience mismatch");
            return Err(AuthError::InvalidToken);
        }

        let user_id = UserId::new(&claims.sub).map_err(|_| {
            tracing::warn!(target: "security", sub = %claims.sub, "Invalid user ID in token");
            AuthError::InvalidToken
        })?;

        let role = claims
            .role
            .as_deref()
            .map(Role::from_claim)
            .unwrap_or_default();

        Ok(AuthenticatedUser::new(user_id, claims.email, role))
    }
}

impl std::fmt::Debug for JwtAccessTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAccessTokenVerifier")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}
