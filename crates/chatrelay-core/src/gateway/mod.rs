//! Connection gateway.
//!
//! Transport-agnostic half of the duplex endpoint: the per-connection state
//! machine and relay logic. The HTTP layer owns the socket and drives a
//! [`Connection`] with inbound text frames while a writer task drains its
//! [`OutboundQueue`].

pub mod connection;
pub mod state;

pub use connection::{Connection, ConnectionConfig, OutboundQueue, PendingReply};
pub use state::{AtomicConnectionState, ConnectionState};
