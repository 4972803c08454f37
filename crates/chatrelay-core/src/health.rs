//! Startup connectivity checks.
//!
//! Each backing resource implements [`VerifyConnection`] on its own; the
//! startup loop in [`verify_all`] runs them in order and stops at the first
//! failure. Dynamic dispatch follows the usual blanket-impl pattern:
//! 1. `VerifyConnection` uses native async fn in traits
//! 2. `VerifyConnectionDyn` is its object-safe twin with boxed futures
//! 3. a blanket impl connects the two

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use chatrelay_types::error::BusError;
use thiserror::Error;
use tracing::{error, info};

use crate::bus::LocalBus;

/// A resource failed its connectivity check.
#[derive(Debug, Error)]
#[error("{component} unreachable: {reason}")]
pub struct ConnectionCheckError {
    pub component: String,
    pub reason: String,
}

impl ConnectionCheckError {
    pub fn new(component: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            component: component.into(),
            reason: reason.to_string(),
        }
    }
}

/// Capability: prove the resource is usable right now.
pub trait VerifyConnection: Send + Sync {
    fn name(&self) -> &str;

    fn verify_connection(
        &self,
    ) -> impl Future<Output = Result<(), ConnectionCheckError>> + Send;
}

/// Object-safe version of [`VerifyConnection`].
pub trait VerifyConnectionDyn: Send + Sync {
    fn name(&self) -> &str;

    fn verify_connection_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectionCheckError>> + Send + 'a>>;
}

impl<T: VerifyConnection> VerifyConnectionDyn for T {
    fn name(&self) -> &str {
        VerifyConnection::name(self)
    }

    fn verify_connection_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectionCheckError>> + Send + 'a>> {
        Box::pin(self.verify_connection())
    }
}

/// Run every check in order. Returns the first failure.
pub async fn verify_all(checks: &[&dyn VerifyConnectionDyn]) -> Result<(), ConnectionCheckError> {
    for check in checks {
        let started = Instant::now();
        match check.verify_connection_boxed().await {
            Ok(()) => info!(
                component = check.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "connection verified"
            ),
            Err(e) => {
                error!(component = check.name(), error = %e, "connection check failed");
                return Err(e);
            }
        }
    }
    Ok(())
}

impl VerifyConnection for LocalBus {
    fn name(&self) -> &str {
        "bus"
    }

    async fn verify_connection(&self) -> Result<(), ConnectionCheckError> {
        if self.is_closed() {
            return Err(ConnectionCheckError::new("bus", BusError::Closed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PubSub;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        name: &'static str,
        healthy: bool,
        calls: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str, healthy: bool) -> Self {
            Self {
                name,
                healthy,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VerifyConnection for Probe {
        fn name(&self) -> &str {
            self.name
        }

        async fn verify_connection(&self) -> Result<(), ConnectionCheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                Ok(())
            } else {
                Err(ConnectionCheckError::new(self.name, "refused"))
            }
        }
    }

    #[tokio::test]
    async fn all_healthy_passes() {
        let a = Probe::new("a", true);
        let b = Probe::new("b", true);
        verify_all(&[&a, &b]).await.unwrap();
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let a = Probe::new("a", false);
        let b = Probe::new("b", true);
        let err = verify_all(&[&a, &b]).await.unwrap_err();
        assert_eq!(err.component, "a");
        assert_eq!(err.to_string(), "a unreachable: refused");
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bus_check_follows_shutdown() {
        let bus = LocalBus::default();
        assert!(bus.verify_connection().await.is_ok());
        bus.shutdown().await;
        assert!(bus.verify_connection().await.is_err());
    }
}
