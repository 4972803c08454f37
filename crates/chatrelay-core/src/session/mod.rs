//! Session authority and its ports.
//!
//! - `codec` -- `TokenCodec`, the signed-token format
//! - `store` -- `SessionStore`, key-value storage with TTL
//! - `authority` -- `SessionAuthority`, issue/validate/revoke

pub mod authority;
pub mod codec;
pub mod store;

pub use authority::{SessionAuthority, session_key, token_hint};
pub use codec::TokenCodec;
pub use store::SessionStore;
