//! Authentication middleware.
//!
//! Callers present the shared `AUTH_SECRET` as a bearer token. When no secret
//! is configured the service runs open, for local development.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Authenticated caller extracted from request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// No secret is configured and the request carried no token
    pub anonymous: bool,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(auth_header, state.config.auth_secret.as_deref())
    }
}

fn authorize(
    header: Option<&str>,
    secret: Option<&str>,
) -> Result<AuthUser, (StatusCode, &'static str)> {
    match (header, secret) {
        (Some(header), secret) => {
            let token = header.strip_prefix("Bearer ").ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            ))?;

            if token.is_empty() {
                return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
            }

            match secret {
                Some(secret) if secret != token => {
                    Err((StatusCode::UNAUTHORIZED, "Invalid bearer token"))
                }
                _ => Ok(AuthUser { anonymous: false }),
            }
        }
        (None, None) => Ok(AuthUser { anonymous: true }),
        (None, Some(_)) => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
    }
}
