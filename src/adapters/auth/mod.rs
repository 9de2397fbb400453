//! Authentication adapters.
//!
//! Implementations of the `AccessTokenVerifier` port:
//!
//! - `jwt` - HS256 tokens issued by the auth service
//! - `mock` - Test implementation that doesn't require signed tokens

mod jwt;
mod mock;

pub use jwt::{JwtAccessTokenVerifier, JwtConfig};
pub use mock::MockAccessTokenVerifier;
