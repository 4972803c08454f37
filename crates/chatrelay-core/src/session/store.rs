//! Session store trait.
//!
//! A string key-value store with per-entry TTL. Implementations live in
//! chatrelay-infra.

use std::time::Duration;

use chatrelay_types::error::RepositoryError;

/// Key-value storage for session records.
///
/// Entries whose TTL has elapsed are invisible to `get` even before
/// `purge_expired` physically removes them.
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SessionStore: Send + Sync {
    /// Insert or replace a value with the given time-to-live.
    fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a live value. Returns None if missing or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Delete a key. Returns whether a live entry was removed.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Remove expired entries. Returns how many were removed.
    fn purge_expired(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
