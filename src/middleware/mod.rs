use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
}

// Bearer JWT extractor: нет токена -> 401, невалидный/просроченный -> 403
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            ApiError::Forbidden("Invalid or expired token".to_string())
        })?;

        Ok(AuthUser { user_id: claims.user_id })
    }
}
