//! Cryptographic operations for chatrelay.
//!
//! - `jwt`: HS256 bearer token signing and verification

pub mod jwt;

pub use jwt::JwtTokenCodec;
