//! Listener that keeps a live enumeration's index in step with its store

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::listener::RecordListener;
use crate::store::RecordStore;
use crate::table::RecordTable;
use crate::types::RecordId;

use super::index::OrderedIndex;

/// Registered on the session while an enumeration is kept updated
///
/// Holds the index weakly: a dropped enumeration leaves nothing to update
/// even if deregistration has not happened yet.
pub(crate) struct LiveIndex {
    index: Weak<Mutex<OrderedIndex>>,
}

impl LiveIndex {
    pub fn new(index: &Arc<Mutex<OrderedIndex>>) -> Self {
        Self {
            index: Arc::downgrade(index),
        }
    }

    fn apply(&self, store: &RecordStore, update: impl FnOnce(&mut OrderedIndex, &RecordTable)) {
        let Some(index) = self.index.upgrade() else {
            return;
        };
        // Lock order: index, then table
        let mut index = index.lock();
        let table = store.session().table();
        update(&mut index, &table);
    }
}

impl RecordListener for LiveIndex {
    fn record_added(&self, store: &RecordStore, record_id: RecordId) {
        self.apply(store, |index, table| index.insert(table, record_id));
    }

    fn record_changed(&self, store: &RecordStore, record_id: RecordId) {
        self.apply(store, |index, table| index.reposition(table, record_id));
    }

    fn record_deleted(&self, store: &RecordStore, record_id: RecordId) {
        self.apply(store, |index, _| index.remove(record_id));
    }
}
