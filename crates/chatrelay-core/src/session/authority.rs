//! Session authority: issues, validates, and revokes bearer tokens.
//!
//! A token is usable iff its signature verifies locally AND its session record
//! still exists in the store. The store is the only revocation mechanism, so
//! validation fails closed when the store cannot be reached.

use std::time::Duration;

use chatrelay_types::error::{AuthError, RejectReason};
use chatrelay_types::identity::{Identity, SessionClaims, SessionRecord, User};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::TokenCodec;
use super::store::SessionStore;

/// Store key for a token's session record.
pub fn session_key(token: &str) -> String {
    format!("session:{token}")
}

/// Short, log-safe prefix of a bearer token.
pub fn token_hint(token: &str) -> &str {
    token.get(..10).unwrap_or(token)
}

/// Issues and checks bearer tokens backed by revocable session records.
pub struct SessionAuthority<C: TokenCodec, S: SessionStore> {
    codec: C,
    store: S,
    ttl: Duration,
}

impl<C: TokenCodec, S: SessionStore> SessionAuthority<C, S> {
    pub fn new(codec: C, store: S, ttl: Duration) -> Self {
        Self { codec, store, ttl }
    }

    /// Validity window of issued tokens (also the record TTL).
    pub fn session_ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user` and write its session record.
    ///
    /// Both steps must succeed; a token whose record could not be written is
    /// discarded.
    pub async fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AuthError::Signing(format!("invalid session ttl: {e}")))?;
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = SessionClaims {
            sub: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::now_v7().to_string(),
        };
        let token = self.codec.sign(&claims)?;

        let record = SessionRecord {
            token: token.clone(),
            subject_id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            expires_at,
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| AuthError::Store(format!("failed to encode session record: {e}")))?;

        self.store
            .put(&session_key(&token), &value, self.ttl)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        info!(user_id = %user.id, token = %token_hint(&token), "issued session token");
        Ok(token)
    }

    /// Resolve a token to the identity it was issued for.
    ///
    /// Every failure is `AuthError::Unauthenticated` with a reason.
    pub async fn validate_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.codec.verify(token).map_err(|reason| {
            debug!(token = %token_hint(token), %reason, "token rejected locally");
            AuthError::Unauthenticated(reason)
        })?;

        let raw = match self.store.get(&session_key(token)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(user_id = %claims.sub, token = %token_hint(token), "no session record");
                return Err(AuthError::Unauthenticated(RejectReason::Revoked));
            }
            Err(e) => {
                warn!(error = %e, "session store unavailable, rejecting token");
                return Err(AuthError::Unauthenticated(RejectReason::StoreUnavailable));
            }
        };

        let record: SessionRecord = serde_json::from_str(&raw).map_err(|e| {
            warn!(user_id = %claims.sub, error = %e, "corrupt session record");
            AuthError::Unauthenticated(RejectReason::Malformed)
        })?;

        if record.subject_id != claims.sub {
            warn!(
                user_id = %claims.sub,
                record_subject = %record.subject_id,
                "session record subject mismatch"
            );
            return Err(AuthError::Unauthenticated(RejectReason::Revoked));
        }

        Ok(record.identity())
    }

    /// Delete the token's session record. Returns whether a live record existed.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, AuthError> {
        let removed = self
            .store
            .delete(&session_key(token))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        info!(token = %token_hint(token), removed, "revoked session token");
        Ok(removed)
    }

    /// Physically remove expired session records.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        self.store
            .purge_expired()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
