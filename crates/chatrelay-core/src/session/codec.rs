//! TokenCodec trait for signing and verifying bearer tokens.
//!
//! Defined in chatrelay-core so the session authority can issue and check
//! tokens without coupling to a specific token format. The HS256 adapter
//! lives in chatrelay-infra.

use chatrelay_types::error::{AuthError, RejectReason};
use chatrelay_types::identity::SessionClaims;

/// Abstraction over a compact signed token format.
pub trait TokenCodec: Send + Sync {
    /// Produce a signed token carrying the claims.
    fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError>;

    /// Check signature and expiry locally. No I/O.
    fn verify(&self, token: &str) -> Result<SessionClaims, RejectReason>;
}
