//! Bearer token verification.
//!
//! `auth_middleware` wraps the whole payments router. A request without a
//! bearer token passes through untouched so public routes and provider
//! webhooks still work; a request with a bad token stops here. Handlers that
//! need a caller take [`RequireAuth`].

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::payments::dto::ErrorResponse;
use crate::domain::foundation::{AuthError, AuthenticatedUser, ErrorCode};
use crate::ports::AccessTokenVerifier;

pub type AuthState = Arc<dyn AccessTokenVerifier>;

/// Token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Verify the bearer token, if any, and stash the caller in request extensions.
pub async fn auth_middleware(
    State(verifier): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        return next.run(request).await;
    };

    match verifier.verify(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(error) => rejection(&error),
    }
}

fn rejection(error: &AuthError) -> Response {
    let (status, code, message) = match error {
        AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "Token expired"),
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "Invalid token"),
        AuthError::InsufficientPermissions => {
            (StatusCode::FORBIDDEN, ErrorCode::Forbidden, "Insufficient permissions")
        }
        AuthError::ServiceUnavailable(detail) => {
            tracing::error!(error = %detail, "Token verification unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::InternalError,
                "Authentication service unavailable",
            )
        }
    };
    (status, Json(ErrorResponse::new(code.as_str(), message))).into_response()
}

/// The verified caller. Rejects with 401 when `auth_middleware` stored none.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireAuth)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new(
                        ErrorCode::Unauthorized.as_str(),
                        "Authentication required",
                    )),
                )
                    .into_response()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockAccessTokenVerifier;
    use axum::{body::Body, http::HeaderValue, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(verifier: MockAccessTokenVerifier) -> Router {
        async fn whoami(RequireAuth(user): RequireAuth) -> String {
            user.id.to_string()
        }
        async fn public() -> &'static str {
            "ok"
        }

        let verifier: AuthState = Arc::new(verifier);
        Router::new()
            .route("/whoami", get(whoami))
            .route("/public", get(public))
            .layer(middleware::from_fn_with_state(verifier, auth_middleware))
    }

    async fn get_with(app: Router, uri: &str, authorization: Option<&str>) -> Response {
        let mut request = axum::http::Request::builder().uri(uri);
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn error_code(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice::<ErrorResponse>(&bytes).unwrap().error_code
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn verified_caller_reaches_the_handler() {
        let app = app(MockAccessTokenVerifier::new().with_customer("tok", "user-123"));
        let response = get_with(app, "/whoami", Some("Bearer tok")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"user-123");
    }

    #[tokio::test]
    async fn anonymous_request_reaches_public_route() {
        let response = get_with(app(MockAccessTokenVerifier::new()), "/public", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn anonymous_request_to_protected_route_is_401() {
        let response = get_with(app(MockAccessTokenVerifier::new()), "/whoami", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn unknown_token_is_rejected_even_on_public_route() {
        let response = get_with(app(MockAccessTokenVerifier::new()), "/public", Some("Bearer forged")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn verifier_outage_is_503() {
        let verifier =
            MockAccessTokenVerifier::new().with_error(AuthError::service_unavailable("jwks down"));
        let response = get_with(app(verifier), "/whoami", Some("Bearer anything")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
