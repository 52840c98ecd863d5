//! Identity checks for authenticated endpoints.
//!
//! Tokens are issued by the identity provider; this service only verifies
//! them. `create_access_token` exists for tooling and tests.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (identity provider user ID)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

impl Claims {
    pub fn new(subject: impl Into<String>, expiration_minutes: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::minutes(expiration_minutes);

        Claims {
            sub: subject.into(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

// ============================================================================
// JWT Operations
// ============================================================================

pub fn create_access_token(subject: &str, secret: &str) -> AppResult<String> {
    let claims = Claims::new(subject, 15); // 15 minute expiration

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to create JWT: {:?}", e);
        AppError::Auth("Failed to create token".into())
    })
}

pub fn validate_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Token validation failed: {:?}", e);
        AppError::Auth("Invalid or expired token".into())
    })
}

// ============================================================================
// Auth Extractor
// ============================================================================

pub struct AuthUser {
    pub subject: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| {
                AppError::Auth("Not authenticated. Cannot fetch OGP data.".into())
            })?;

        let claims = validate_token(bearer.token(), &state.jwt_secret)?;

        if claims.sub.is_empty() {
            return Err(AppError::Auth("Token has no subject".into()));
        }

        Ok(AuthUser {
            subject: claims.sub,
        })
    }
}
