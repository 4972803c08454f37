//! Correlation relay: match one asynchronous reply to one request.
//!
//! - `waiter` -- `CorrelationWaiter`, the single-assignment result slot
//! - `relay` -- `CorrelationRelay`, publish + transient reply subscription

pub mod relay;
pub mod waiter;

pub use relay::{CorrelationRelay, RelayRequest};
pub use waiter::{CorrelationWaiter, WaiterState};
