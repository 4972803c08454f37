//! Axum router configuration with middleware.
//!
//! REST routes are under `/api/v1/`, the gateway is at `/ws/chat`.
//! Middleware: CORS, tracing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chatrelay_core::health::{VerifyConnectionDyn, verify_all};

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Session
        .route("/auth/session", get(handlers::session::get_session))
        .route("/auth/logout", post(handlers::session::logout))
        // One-shot relay
        .route("/chat/ask", post(handlers::chat::ask))
        // Chats
        .route(
            "/chats",
            post(handlers::chat::create_chat).get(handlers::chat::list_chats),
        )
        .route(
            "/chats/{id}",
            get(handlers::chat::get_chat).delete(handlers::chat::delete_chat),
        )
        .route("/chats/{id}/open", patch(handlers::chat::open_chat))
        .route("/chats/{id}/close", patch(handlers::chat::close_chat));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/chat", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Connectivity of the database and the bus (no auth required).
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let checks: [&dyn VerifyConnectionDyn; 2] = [&state.db_pool, state.bus.as_ref()];
    match verify_all(&checks).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "component": e.component,
                "reason": e.reason,
            })),
        ),
    }
}
