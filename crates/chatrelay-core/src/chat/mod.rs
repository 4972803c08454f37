//! Chat persistence abstractions.
//!
//! This module defines the `ChatStore` trait that the infrastructure layer
//! implements for chat aggregates and their messages.

pub mod store;

pub use store::ChatStore;
