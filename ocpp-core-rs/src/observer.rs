//! Listener lists for dispatch and registry events
//!
//! Listeners run synchronously, in registration order. A panicking listener
//! is logged and skipped; it never stops the remaining listeners or the
//! operation that raised the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

/// Handle returned by [`Observers::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of listeners for events of type `E`
pub struct Observers<E> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Observers<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the id was not registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify(&self, event: &E) {
        // Snapshot so a listener may (un)register without deadlocking
        let snapshot: Vec<(ListenerId, Listener<E>)> = self.listeners.read().clone();

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!("{} listener {:?} panicked; continuing", self.name, id);
            }
        }
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("name", &self.name)
            .field("listeners", &self.len())
            .finish()
    }
}
