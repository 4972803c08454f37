//! Bearer token authentication extractor.
//!
//! Extracts the session token from:
//! - `Authorization: Bearer <token>` header
//! - `?token=<token>` query parameter (browsers cannot set headers on a
//!   WebSocket handshake)
//!
//! The token is validated by the session authority: signature and expiry
//! locally, then the session record in the store.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use chatrelay_core::session::token_hint;
use chatrelay_types::identity::Identity;

use crate::http::error::AppError;
use crate::state::AppState;

/// An authenticated caller. Extracting this validates the bearer token.
#[derive(Debug)]
pub struct Authenticated {
    pub identity: Identity,
    /// The raw token, kept for logout.
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;

        match state.authority.validate_token(&token).await {
            Ok(identity) => Ok(Authenticated { identity, token }),
            Err(e) => {
                tracing::debug!(token = token_hint(&token), error = %e, "bearer token rejected");
                Err(AppError::from(e))
            }
        }
    }
}

/// Extract the bearer token from the request.
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }

    if let Ok(Query(query)) = Query::<TokenQuery>::try_from_uri(&parts.uri) {
        if let Some(token) = query.token.filter(|t| !t.is_empty()) {
            return Ok(token);
        }
    }

    Err(AppError::Unauthorized(
        "Missing session token. Provide via 'Authorization: Bearer <token>' header or 'token' query parameter.".to_string(),
    ))
}
