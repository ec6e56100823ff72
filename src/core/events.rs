//! Ordered observer lists
//!
//! An [`ObserverList`] holds callbacks in registration order and invokes them
//! synchronously on whichever thread calls [`ObserverList::notify_with`].
//! The callback type is a trait object such as
//! `dyn Fn(&TileEvent<'_>) + Send + Sync`, so lists can be shared across
//! the main thread and background workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Handle returned by [`ObserverList::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Ordered list of registered callbacks for one event
pub struct ObserverList<F: ?Sized> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(ObserverId, Arc<F>)>>,
}

impl<F: ?Sized> Default for ObserverList<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> ObserverList<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; it runs after every previously registered one
    pub fn subscribe(&self, callback: Arc<F>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, callback));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.callbacks.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Invoke `call` once per registered callback, in registration order
    ///
    /// The list is snapshotted first so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify_with(&self, mut call: impl FnMut(&F)) {
        let snapshot: Vec<Arc<F>> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in &snapshot {
            call(callback);
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for ObserverList<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}
