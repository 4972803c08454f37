//! Infrastructure layer for chatrelay.
//!
//! Contains implementations of the port traits defined in `chatrelay-core`:
//! SQLite storage (sessions, chats, permissions), HS256 token signing, and
//! configuration/data-directory loading.

pub mod config;
pub mod crypto;
pub mod data_dir;
pub mod sqlite;
