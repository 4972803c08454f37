//! Relay logic and port trait definitions for chatrelay.
//!
//! This crate defines the "ports" (bus, session store, token codec, chat store,
//! permission check) that the infrastructure layer implements, and the logic
//! built on them. It depends only on `chatrelay-types` -- never on
//! `chatrelay-infra` or any database/IO crate.

pub mod bus;
pub mod chat;
pub mod correlation;
pub mod gateway;
pub mod health;
pub mod permission;
pub mod responder;
pub mod session;
