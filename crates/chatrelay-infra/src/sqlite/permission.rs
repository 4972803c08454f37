//! SQLite agent permission repository.
//!
//! Implements `PermissionCheck` from `chatrelay-core`. A grant is one row in
//! `agent_permissions`; granting twice is a no-op.

use chatrelay_core::permission::PermissionCheck;
use chatrelay_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `PermissionCheck`.
pub struct SqlitePermissionRepository {
    pool: DatabasePool,
}

impl SqlitePermissionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl PermissionCheck for SqlitePermissionRepository {
    async fn has_permission(&self, user_id: &str, agent_id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM agent_permissions WHERE user_id = ? AND agent_id = ?) AS allowed",
        )
        .bind(user_id)
        .bind(agent_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let allowed: i64 = row
            .try_get("allowed")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(allowed != 0)
    }

    async fn grant(&self, agent_id: &str, user_ids: &[String]) -> Result<u64, RepositoryError> {
        let granted_at = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut inserted = 0;
        for user_id in user_ids {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO agent_permissions (agent_id, user_id, granted_at) VALUES (?, ?, ?)",
            )
            .bind(agent_id)
            .bind(user_id)
            .bind(&granted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(inserted)
    }

    async fn users_with_permission(&self, agent_id: &str) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id FROM agent_permissions WHERE agent_id = ? ORDER BY granted_at ASC, user_id ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("user_id")
                    .map_err(|e| RepositoryError::Query(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repo() -> (tempfile::TempDir, SqlitePermissionRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqlitePermissionRepository::new(pool))
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_no_permission_by_default() {
        let (_dir, repo) = test_repo().await;
        assert!(!repo.has_permission("7", "3").await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_and_check() {
        let (_dir, repo) = test_repo().await;
        assert_eq!(repo.grant("3", &ids(&["7", "8"])).await.unwrap(), 2);

        assert!(repo.has_permission("7", "3").await.unwrap());
        assert!(repo.has_permission("8", "3").await.unwrap());
        assert!(!repo.has_permission("7", "4").await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let (_dir, repo) = test_repo().await;
        repo.grant("3", &ids(&["7"])).await.unwrap();
        assert_eq!(repo.grant("3", &ids(&["7", "9"])).await.unwrap(), 1);

        let mut users = repo.users_with_permission("3").await.unwrap();
        users.sort();
        assert_eq!(users, ids(&["7", "9"]));
    }
}
