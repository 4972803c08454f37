//! Agent permission port.
//!
//! Which users may talk to which agents. The gateway only asks
//! `has_permission`; granting is an administrative operation.

use chatrelay_types::error::RepositoryError;

/// Repository trait for user-to-agent permissions.
///
/// Implementations live in chatrelay-infra (e.g., `SqlitePermissionRepository`).
pub trait PermissionCheck: Send + Sync {
    fn has_permission(
        &self,
        user_id: &str,
        agent_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Grant every listed user access to `agent_id`. Existing grants are kept.
    /// Returns how many new grants were written.
    fn grant(
        &self,
        agent_id: &str,
        user_ids: &[String],
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    fn users_with_permission(
        &self,
        agent_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
