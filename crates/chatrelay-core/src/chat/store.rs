//! ChatStore trait definition.
//!
//! The chat aggregate store consumed by the gateway and the REST surface.
//! Follows the same RPITIT pattern as the other ports in this crate.

use chatrelay_types::chat::{Chat, ChatMessage, ChatStatus};
use chatrelay_types::error::RepositoryError;

/// Repository trait for chat aggregates.
///
/// Implementations live in chatrelay-infra (e.g., `SqliteChatStore`).
/// Messages are append-only; the `bool` results report whether the chat
/// existed.
pub trait ChatStore: Send + Sync {
    /// Create an empty, open chat owned by `owner_id`.
    fn create_chat(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Chat, RepositoryError>> + Send;

    /// Get a chat with its messages in insertion order.
    fn get_chat(
        &self,
        chat_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// Append a message and touch `updated_at`.
    fn append_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn set_chat_status(
        &self,
        chat_id: &str,
        status: ChatStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// List a user's chats, most recently updated first (without messages).
    fn list_user_chats(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Chat>, RepositoryError>> + Send;

    /// Delete a chat and its messages.
    fn delete_chat(
        &self,
        chat_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
