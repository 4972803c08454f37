use std::time::Duration;

use thiserror::Error;

/// Why a bearer token was rejected.
///
/// Every variant means the caller is unauthenticated; the reason is kept for
/// logging and never changes the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Signature did not verify or the token could not be decoded.
    Malformed,
    /// Signature verified but the expiry has passed.
    Expired,
    /// Signature verified but no session record exists for the token.
    Revoked,
    /// The session store could not be reached. Fails closed.
    StoreUnavailable,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Malformed => write!(f, "malformed or badly signed token"),
            RejectReason::Expired => write!(f, "token expired"),
            RejectReason::Revoked => write!(f, "session revoked"),
            RejectReason::StoreUnavailable => write!(f, "session store unavailable"),
        }
    }
}

/// Errors from the session authority.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(RejectReason),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("session store error: {0}")]
    Store(String),
}

impl AuthError {
    /// True for every validation failure (as opposed to issuance failures).
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::Unauthenticated(_))
    }
}

/// Errors from the publish/subscribe bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been shut down; no further publish or subscribe is possible.
    #[error("bus is closed")]
    Closed,

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Errors from the correlation relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No matching reply arrived before the deadline. Retryable.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The owning scope was cancelled while waiting.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl RelayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Timeout(_) | RelayError::Bus(_))
    }
}

/// Errors from repository operations (used by trait definitions in chatrelay-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors that end a gateway connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("outbound queue closed")]
    WriterClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::Unauthenticated(RejectReason::Revoked);
        assert_eq!(err.to_string(), "unauthenticated: session revoked");
        assert!(err.is_unauthenticated());
        assert!(!AuthError::Store("down".to_string()).is_unauthenticated());
    }

    #[test]
    fn test_relay_timeout_is_retryable() {
        assert!(RelayError::Timeout(Duration::from_secs(15)).is_retryable());
        assert!(RelayError::Bus(BusError::Closed).is_retryable());
        assert!(!RelayError::Cancelled.is_retryable());
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }
}
