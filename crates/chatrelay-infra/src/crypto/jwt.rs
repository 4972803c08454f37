//! HS256 bearer tokens.
//!
//! Implements the `TokenCodec` trait from `chatrelay-core` using the
//! `jsonwebtoken` crate. Verification is purely local: signature, algorithm,
//! and expiry with zero leeway. Revocation is the session store's job.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use chatrelay_core::session::TokenCodec;
use chatrelay_types::error::{AuthError, RejectReason};
use chatrelay_types::identity::SessionClaims;

/// Shortest accepted signing key, in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// HS256 implementation of `TokenCodec`.
pub struct JwtTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    fingerprint: String,
}

impl JwtTokenCodec {
    /// Build a codec from the configured private key.
    pub fn new(key: &SecretString) -> Result<Self, AuthError> {
        let bytes = key.expose_secret().as_bytes();
        if bytes.len() < MIN_KEY_LEN {
            return Err(AuthError::Signing(format!(
                "token key must be at least {MIN_KEY_LEN} bytes"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let digest = Sha256::digest(bytes);
        let fingerprint = format!("{:x}", digest)[..16].to_string();

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
            fingerprint,
        })
    }

    /// First 16 hex chars of the key's SHA-256. Safe to log; lets operators
    /// confirm two instances share a key.
    pub fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl TokenCodec for JwtTokenCodec {
    fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, RejectReason> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => RejectReason::Expired,
                _ => RejectReason::Malformed,
            })
    }
}
