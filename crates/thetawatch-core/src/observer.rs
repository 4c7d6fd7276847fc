//! Observer registry with isolated dispatch.
//!
//! Callbacks are registered with an explicit handle and removed through it.
//! Dispatch snapshots the observer list first, so a callback may register
//! or unregister observers without deadlocking. A callback that returns an
//! error or panics is logged and skipped; the remaining observers still
//! receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::warn;

/// Error returned by an observer callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("observer callback failed: {0}")]
pub struct ObserverError(pub String);

impl From<String> for ObserverError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObserverError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Result type for observer callbacks.
pub type ObserverResult = std::result::Result<(), ObserverError>;

type ObserverFn<E> = Arc<dyn Fn(&E) -> ObserverResult + Send + Sync>;

/// Handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fan-out list of callbacks for events of type `E`.
pub struct ObserverRegistry<E> {
    name: &'static str,
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, ObserverFn<E>)>>,
}

impl<E> ObserverRegistry<E> {
    /// Create an empty registry. `name` appears in failure logs.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback.
    pub fn register<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&E) -> ObserverResult + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if the handle was unknown.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver `event` to every registered callback.
    pub fn notify(&self, event: &E) -> DispatchReport {
        let observers: Vec<(ObserverId, ObserverFn<E>)> = self.observers.read().clone();
        let mut report = DispatchReport::default();

        for (id, callback) in observers {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(registry = self.name, observer = id.0, error = %e, "Observer callback failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(registry = self.name, observer = id.0, "Observer callback panicked");
                }
            }
        }

        report
    }
}

impl<E> std::fmt::Debug for ObserverRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("name", &self.name)
            .field("observers", &self.len())
            .finish()
    }
}
