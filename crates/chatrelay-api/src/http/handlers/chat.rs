//! Chat HTTP handlers.
//!
//! Endpoints:
//! - POST  /api/v1/chat/ask          - One request, one correlated reply
//! - POST  /api/v1/chats             - Create a chat for the caller
//! - GET   /api/v1/chats             - List the caller's chats
//! - GET   /api/v1/chats/{id}        - Get a chat with its messages
//! - DELETE /api/v1/chats/{id}       - Delete a chat and its messages
//! - PATCH /api/v1/chats/{id}/open   - Reopen a chat
//! - PATCH /api/v1/chats/{id}/close  - Close a chat

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use chatrelay_core::chat::ChatStore;
use chatrelay_core::correlation::RelayRequest;
use chatrelay_core::permission::PermissionCheck;
use chatrelay_types::chat::{Chat, ChatStatus};
use chatrelay_types::identity::{Identity, UserRole};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Request body for a one-shot question.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub agent_id: String,
    pub text: String,
}

/// The correlated reply.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub conversation_id: String,
    pub agent_id: String,
    pub message: String,
}

/// POST /api/v1/chat/ask - Publish one message and wait for its reply.
///
/// Returns 504 when no reply arrives within the relay timeout.
pub async fn ask(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(body): Json<AskRequest>,
) -> Result<Json<ApiResponse<AskResponse>>, AppError> {
    let timer = RequestTimer::start();

    if body.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }

    let user_id = auth.identity.subject_id;
    if !state.permissions.has_permission(&user_id, &body.agent_id).await? {
        return Err(AppError::Forbidden(format!(
            "user {user_id} may not use agent {}",
            body.agent_id
        )));
    }

    let request = RelayRequest {
        user_id,
        agent_id: body.agent_id.clone(),
        text: body.text,
    };
    let reply = state
        .relay
        .send_with_cancel(request, &state.shutdown)
        .await?;

    Ok(Json(timer.success(AskResponse {
        conversation_id: reply.correlation_id,
        agent_id: body.agent_id,
        message: reply.text,
    })))
}

/// Response body for chat deletion.
#[derive(Debug, Serialize)]
pub struct DeleteChatResponse {
    pub id: String,
    pub deleted: bool,
}

/// POST /api/v1/chats - Create an empty open chat owned by the caller.
pub async fn create_chat(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let timer = RequestTimer::start();

    let chat = state.chats.create_chat(&auth.identity.subject_id).await?;
    tracing::info!(chat_id = %chat.id, user_id = %chat.owner_id, "chat created");

    let href = format!("/api/v1/chats/{}", chat.id);
    Ok(Json(timer.success(chat).with_link("self", &href)))
}

/// GET /api/v1/chats - List the caller's chats, most recently updated first.
pub async fn list_chats(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<Chat>>>, AppError> {
    let timer = RequestTimer::start();
    let chats = state.chats.list_user_chats(&auth.identity.subject_id).await?;
    Ok(Json(timer.success(chats).with_link("self", "/api/v1/chats")))
}

/// GET /api/v1/chats/{id} - Get a chat with its messages.
pub async fn get_chat(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let timer = RequestTimer::start();
    let chat = load_owned_chat(&state, &auth.identity, &chat_id).await?;
    Ok(Json(timer.success(chat)))
}

/// DELETE /api/v1/chats/{id} - Delete a chat the caller owns.
///
/// Admins may read other users' chats but not delete them.
pub async fn delete_chat(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<DeleteChatResponse>>, AppError> {
    let timer = RequestTimer::start();

    let chat = load_owned_chat(&state, &auth.identity, &chat_id).await?;
    if chat.owner_id != auth.identity.subject_id {
        return Err(AppError::Forbidden(format!("chat {chat_id} belongs to another user")));
    }
    if !state.chats.delete_chat(&chat_id).await? {
        return Err(chat_not_found(&chat_id));
    }
    tracing::info!(%chat_id, user_id = %auth.identity.subject_id, "chat deleted");

    Ok(Json(timer.success(DeleteChatResponse {
        id: chat_id,
        deleted: true,
    })))
}

/// PATCH /api/v1/chats/{id}/open
pub async fn open_chat(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    set_status(state, auth.identity, chat_id, ChatStatus::Open).await
}

/// PATCH /api/v1/chats/{id}/close
pub async fn close_chat(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    set_status(state, auth.identity, chat_id, ChatStatus::Closed).await
}

async fn set_status(
    state: AppState,
    identity: Identity,
    chat_id: String,
    status: ChatStatus,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let timer = RequestTimer::start();

    load_owned_chat(&state, &identity, &chat_id).await?;
    if !state.chats.set_chat_status(&chat_id, status).await? {
        return Err(chat_not_found(&chat_id));
    }
    tracing::info!(%chat_id, %status, "chat status changed");

    let chat = load_owned_chat(&state, &identity, &chat_id).await?;
    Ok(Json(timer.success(chat)))
}

/// Load a chat the caller owns. Admins may read any chat.
async fn load_owned_chat(
    state: &AppState,
    identity: &Identity,
    chat_id: &str,
) -> Result<Chat, AppError> {
    let chat = state
        .chats
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| chat_not_found(chat_id))?;

    if chat.owner_id != identity.subject_id && identity.role != UserRole::Admin {
        return Err(AppError::Forbidden(format!("chat {chat_id} belongs to another user")));
    }
    Ok(chat)
}

fn chat_not_found(chat_id: &str) -> AppError {
    AppError::NotFound(format!("chat {chat_id} not found"))
}
