use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

/// Tokens are issued elsewhere; this service only verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Decode and validate a JWT, returning the claims
pub fn decode_jwt(secret: &str, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    match header.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => {
            let token = header[7..].trim();
            (!token.is_empty()).then_some(token)
        }
        _ => None,
    }
}

/// Extractor for the authenticated user id (the token's `sub`).
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        let token = bearer_token(auth_header).ok_or_else(|| {
            tracing::debug!("Authorization header is not a bearer token");
            AppError::Unauthorized
        })?;

        let claims = decode_jwt(&state.config.jwt.secret, token).map_err(|e| {
            tracing::debug!("Failed to validate token: {:?}", e);
            e
        })?;

        if claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }

        tracing::debug!("Authenticated user: {}", claims.sub);
        Ok(AuthUser(claims.sub))
    }
}
