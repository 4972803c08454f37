//! Single-assignment wait slot for one correlated reply.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chatrelay_types::wire::ReplyEnvelope;
use tokio::sync::oneshot;
use tokio::time::Instant;

const PENDING: u8 = 0;
const RESOLVED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Lifecycle of a waiter. Leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Pending,
    Resolved,
    TimedOut,
}

/// Waits for the reply carrying `id`.
///
/// `resolve` and `expire` race through a compare-and-swap on the state, so at
/// most one of them ever wins.
#[derive(Debug)]
pub struct CorrelationWaiter {
    id: String,
    deadline: Instant,
    state: AtomicU8,
    slot: Mutex<Option<oneshot::Sender<ReplyEnvelope>>>,
}

impl CorrelationWaiter {
    /// Create a pending waiter and the receiver its result is delivered on.
    pub fn new(
        id: impl Into<String>,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<ReplyEnvelope>) {
        let (tx, rx) = oneshot::channel();
        let waiter = Self {
            id: id.into(),
            deadline: Instant::now() + timeout,
            state: AtomicU8::new(PENDING),
            slot: Mutex::new(Some(tx)),
        };
        (waiter, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> WaiterState {
        match self.state.load(Ordering::SeqCst) {
            PENDING => WaiterState::Pending,
            RESOLVED => WaiterState::Resolved,
            _ => WaiterState::TimedOut,
        }
    }

    /// Deliver the reply. Returns false if the waiter already left `Pending`.
    pub fn resolve(&self, reply: ReplyEnvelope) -> bool {
        if self
            .state
            .compare_exchange(PENDING, RESOLVED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if let Some(tx) = self.take_slot() {
            // The receiver may already be gone if the caller was cancelled.
            let _ = tx.send(reply);
        }
        true
    }

    /// Close the waiter without a result. Returns false if it was already resolved
    /// or expired.
    pub fn expire(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, TIMED_OUT, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        drop(self.take_slot());
        true
    }

    fn take_slot(&self) -> Option<oneshot::Sender<ReplyEnvelope>> {
        self.slot.lock().expect("waiter slot lock poisoned").take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(id: &str, text: &str) -> ReplyEnvelope {
        ReplyEnvelope {
            correlation_id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_delivers_once() {
        let (waiter, rx) = CorrelationWaiter::new("abc", Duration::from_secs(1));
        assert_eq!(waiter.state(), WaiterState::Pending);

        assert!(waiter.resolve(reply("abc", "first")));
        assert!(!waiter.resolve(reply("abc", "second")));
        assert!(!waiter.expire());

        assert_eq!(waiter.state(), WaiterState::Resolved);
        assert_eq!(rx.await.unwrap().text, "first");
    }

    #[tokio::test]
    async fn expire_closes_the_slot() {
        let (waiter, rx) = CorrelationWaiter::new("abc", Duration::from_secs(1));

        assert!(waiter.expire());
        assert!(!waiter.resolve(reply("abc", "late")));

        assert_eq!(waiter.state(), WaiterState::TimedOut);
        assert!(rx.await.is_err());
    }

    #[test]
    fn deadline_is_in_the_future() {
        let (waiter, _rx) = CorrelationWaiter::new("abc", Duration::from_secs(15));
        assert!(waiter.deadline() > Instant::now());
        assert_eq!(waiter.id(), "abc");
    }
}
