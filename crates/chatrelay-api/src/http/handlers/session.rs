//! Session HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/auth/session - Identity behind the bearer token
//! - POST /api/v1/auth/logout  - Revoke the bearer token

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use chatrelay_core::session::token_hint;
use chatrelay_types::identity::Identity;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Response body for logout.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

/// GET /api/v1/auth/session - Validate the bearer token and return its identity.
pub async fn get_session(auth: Authenticated) -> Json<ApiResponse<Identity>> {
    let timer = RequestTimer::start();
    Json(timer.success(auth.identity).with_link("logout", "/api/v1/auth/logout"))
}

/// POST /api/v1/auth/logout - Delete the session record.
///
/// The token stops validating immediately, even though its signature has
/// not expired.
pub async fn logout(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<LogoutResponse>>, AppError> {
    let timer = RequestTimer::start();

    let revoked = state.authority.revoke_token(&auth.token).await?;
    tracing::info!(
        user_id = %auth.identity.subject_id,
        token = token_hint(&auth.token),
        "session revoked"
    );

    Ok(Json(timer.success(LogoutResponse { revoked })))
}
