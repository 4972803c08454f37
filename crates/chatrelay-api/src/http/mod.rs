//! HTTP layer for chatrelay.
//!
//! Axum-based server: the `/ws/chat` WebSocket gateway, a small REST API at
//! `/api/v1/` with bearer token authentication and envelope response format,
//! and an unauthenticated `/health` probe.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
