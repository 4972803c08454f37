//! Shared domain types for the chat relay.
//!
//! This crate contains the types used across the relay: session identity,
//! chat aggregates, wire frames and bus envelopes, configuration, and the
//! error enums returned by the core and infrastructure layers.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod wire;
