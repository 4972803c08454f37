//! SQLite chat store implementation.
//!
//! Implements `ChatStore` from `chatrelay-core` using sqlx with split read/write pools.
//! Raw queries, private Row structs, reader pool for SELECTs and writer pool for
//! everything else.

use chatrelay_core::chat::ChatStore;
use chatrelay_types::chat::{Chat, ChatMessage, ChatStatus, Sender};
use chatrelay_types::error::RepositoryError;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatStore`.
pub struct SqliteChatStore {
    pool: DatabasePool,
}

impl SqliteChatStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT sender, text, created_at FROM chat_messages WHERE chat_id = ? ORDER BY seq ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row =
                ChatMessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain Chat (without messages).
struct ChatRow {
    id: String,
    owner_id: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_chat(self, messages: Vec<ChatMessage>) -> Result<Chat, RepositoryError> {
        let status: ChatStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(Chat {
            id: self.id,
            owner_id: self.owner_id,
            messages,
            status,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    sender: String,
    text: String,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            sender: row.try_get("sender")?,
            text: row.try_get("text")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let sender: Sender = self
            .sender
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ChatMessage {
            sender,
            text: self.text,
            timestamp: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// ChatStore implementation
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    async fn create_chat(&self, owner_id: &str) -> Result<Chat, RepositoryError> {
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.to_string(),
            messages: Vec::new(),
            status: ChatStatus::Open,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO chats (id, owner_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(&chat.owner_id)
        .bind(chat.status.to_string())
        .bind(format_datetime(&chat.created_at))
        .bind(format_datetime(&chat.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let chat_row = ChatRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let messages = self.load_messages(chat_id).await?;
        Ok(Some(chat_row.into_chat(messages)?))
    }

    async fn append_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let touched = sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if touched.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO chat_messages (chat_id, sender, text, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(message.sender.to_string())
        .bind(&message.text)
        .bind(format_datetime(&message.timestamp))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(true)
    }

    async fn set_chat_status(
        &self,
        chat_id: &str,
        status: ChatStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE chats SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(format_datetime(&Utc::now()))
            .bind(chat_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_user_chats(&self, owner_id: &str) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chats WHERE owner_id = ? ORDER BY updated_at DESC")
            .bind(owner_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in &rows {
            let chat_row =
                ChatRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            chats.push(chat_row.into_chat(Vec::new())?);
        }

        Ok(chats)
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<bool, RepositoryError> {
        // Messages go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, SqliteChatStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteChatStore::new(pool))
    }

    #[tokio::test]
    async fn test_create_and_get_chat() {
        let (_dir, store) = test_store().await;
        let chat = store.create_chat("7").await.unwrap();

        let loaded = store.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(loaded.owner_id, "7");
        assert_eq!(loaded.status, ChatStatus::Open);
        assert!(loaded.messages.is_empty());

        assert!(store.get_chat("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let (_dir, store) = test_store().await;
        let chat = store.create_chat("7").await.unwrap();

        assert!(store.append_message(&chat.id, &ChatMessage::user("hi")).await.unwrap());
        assert!(
            store
                .append_message(&chat.id, &ChatMessage::assistant("hi-reply"))
                .await
                .unwrap()
        );
        assert!(store.append_message(&chat.id, &ChatMessage::user("again")).await.unwrap());

        let loaded = store.get_chat(&chat.id).await.unwrap().unwrap();
        let texts: Vec<&str> = loaded.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hi-reply", "again"]);
        assert_eq!(loaded.messages[1].sender, Sender::Assistant);
        assert!(loaded.updated_at >= loaded.created_at);
    }

    #[tokio::test]
    async fn test_append_to_missing_chat() {
        let (_dir, store) = test_store().await;
        assert!(!store.append_message("missing", &ChatMessage::user("hi")).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_chat_status() {
        let (_dir, store) = test_store().await;
        let chat = store.create_chat("7").await.unwrap();

        assert!(store.set_chat_status(&chat.id, ChatStatus::Closed).await.unwrap());
        let loaded = store.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ChatStatus::Closed);

        assert!(store.set_chat_status(&chat.id, ChatStatus::Open).await.unwrap());
        assert!(!store.set_chat_status("missing", ChatStatus::Open).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_user_chats_most_recent_first() {
        let (_dir, store) = test_store().await;
        let older = store.create_chat("7").await.unwrap();
        let newer = store.create_chat("7").await.unwrap();
        store.create_chat("8").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append_message(&older.id, &ChatMessage::user("bump")).await.unwrap();

        let chats = store.list_user_chats("7").await.unwrap();
        let ids: Vec<&str> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), newer.id.as_str()]);
    }

    #[tokio::test]
    async fn test_delete_chat_removes_messages() {
        let (_dir, store) = test_store().await;
        let chat = store.create_chat("7").await.unwrap();
        store.append_message(&chat.id, &ChatMessage::user("hi")).await.unwrap();

        assert!(store.delete_chat(&chat.id).await.unwrap());
        assert!(store.get_chat(&chat.id).await.unwrap().is_none());
        assert!(!store.delete_chat(&chat.id).await.unwrap());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_messages")
            .fetch_one(&store.pool.reader)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
