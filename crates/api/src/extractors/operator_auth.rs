//! Operator JWT authentication extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::{Actor, ActorRole};
use shared::jwt::{extract_user_id, JwtError, TokenVerifier};

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated operator from a Bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth {
    pub user_id: i64,
    pub role: ActorRole,
}

impl OperatorAuth {
    /// Validates a raw token. Used by the WebSocket upgrade, which takes the
    /// token from the query string.
    pub fn from_token(verifier: &TokenVerifier, token: &str) -> Result<Self, ApiError> {
        let claims = verifier.validate(token).map_err(|e| match e {
            JwtError::TokenExpired => ApiError::Unauthorized("Token has expired".to_string()),
            _ => ApiError::Unauthorized("Invalid or expired token".to_string()),
        })?;
        let user_id = extract_user_id(&claims)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(Self {
            user_id,
            role: ActorRole::from_claim(&claims.role),
        })
    }

    pub fn actor(&self) -> Actor {
        Actor::user(self.user_id, self.role)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Invalid Authorization header format".to_string())
        })?;

        Self::from_token(&state.token_verifier, token)
    }
}
