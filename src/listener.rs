//! Record listeners
//!
//! Observers of record mutations on an open store. Dispatch is synchronous:
//! every listener runs, in registration order, after the mutation is durable
//! and before the mutating call returns.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::RecordStore;
use crate::types::RecordId;

/// Receives record mutation events from a record store
///
/// Callbacks run on the mutating thread while the store's write lock is held.
/// Reading the store from a callback is fine; the write lock is re-entrant, so
/// mutating it is too, but nested events are then delivered before the outer
/// call returns.
pub trait RecordListener: Send + Sync {
    /// A record was added
    fn record_added(&self, store: &RecordStore, record_id: RecordId);

    /// A record's payload was replaced
    fn record_changed(&self, store: &RecordStore, record_id: RecordId);

    /// A record was deleted
    fn record_deleted(&self, store: &RecordStore, record_id: RecordId);
}

/// Kind of record mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEvent {
    Added(RecordId),
    Changed(RecordId),
    Deleted(RecordId),
}

impl RecordEvent {
    pub fn record_id(&self) -> RecordId {
        match *self {
            RecordEvent::Added(id) | RecordEvent::Changed(id) | RecordEvent::Deleted(id) => id,
        }
    }
}

/// Ordered set of listeners owned by one store session
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn RecordListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; registering the same `Arc` twice is a no-op
    pub fn add(&self, listener: Arc<dyn RecordListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Deregister a listener; unknown listeners are ignored
    pub fn remove(&self, listener: &Arc<dyn RecordListener>) {
        self.listeners.write().retain(|l| !same_listener(l, listener));
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Deliver an event to every listener in registration order
    ///
    /// Works on a snapshot so callbacks may add or remove listeners.
    pub fn dispatch(&self, store: &RecordStore, event: RecordEvent) {
        let snapshot: Vec<Arc<dyn RecordListener>> = self.listeners.read().clone();
        for listener in snapshot {
            match event {
                RecordEvent::Added(id) => listener.record_added(store, id),
                RecordEvent::Changed(id) => listener.record_changed(store, id),
                RecordEvent::Deleted(id) => listener.record_deleted(store, id),
            }
        }
    }
}

/// Listener identity is the allocation, not the vtable
fn same_listener(a: &Arc<dyn RecordListener>, b: &Arc<dyn RecordListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
