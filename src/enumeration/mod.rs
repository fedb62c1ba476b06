//! Enumeration Module
//!
//! Filtered, ordered, bidirectional traversal over a store's records.
//!
//! ## Responsibilities
//! - Select records with an optional `RecordFilter`
//! - Order them with an optional `RecordComparator` (ties by ascending id)
//! - Step forward and backward; payloads are always read live
//! - Optionally follow later mutations through a store listener
//!
//! ## Tracking
//! ```text
//!   snapshot:  ids fixed at build/rebuild; deleted ids fail with InvalidId
//!   live:      RecordStore ──added/changed/deleted──► LiveIndex ──► OrderedIndex
//! ```

mod index;
mod live;

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::engine::Session;
use crate::error::{Result, RmsError};
use crate::listener::RecordListener;
use crate::types::RecordId;

use index::OrderedIndex;
use live::LiveIndex;

/// Decides whether a record takes part in an enumeration
pub trait RecordFilter: Send + Sync {
    fn matches(&self, candidate: &[u8]) -> bool;
}

impl<F> RecordFilter for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn matches(&self, candidate: &[u8]) -> bool {
        self(candidate)
    }
}

/// Orders two record payloads within an enumeration
pub trait RecordComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

impl<F> RecordComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// A cursor over the records of one store
///
/// Obtained from `RecordStore::enumerate_records`. It does not keep the
/// store open: once the last handle closes, every call fails with
/// `NotOpen`. After `destroy` every call fails with `InvalidState`.
pub struct RecordEnumeration {
    session: Weak<Session>,
    index: Arc<Mutex<OrderedIndex>>,
    /// Registered listener while kept updated
    live: Option<Arc<dyn RecordListener>>,
    destroyed: bool,
}

impl RecordEnumeration {
    pub(crate) fn new(
        session: &Arc<Session>,
        filter: Option<Box<dyn RecordFilter>>,
        comparator: Option<Box<dyn RecordComparator>>,
        keep_updated: bool,
    ) -> Result<Self> {
        session.ensure_open()?;

        let mut enumeration = Self {
            session: Arc::downgrade(session),
            index: Arc::new(Mutex::new(OrderedIndex::new(filter, comparator))),
            live: None,
            destroyed: false,
        };
        {
            // No mutation may land between the build and registration
            let _write_guard = session.lock_writes();
            enumeration.rebuild()?;
            if keep_updated {
                enumeration.track(session);
            }
        }

        tracing::trace!(
            "Enumerating {} ({} records, live: {})",
            session.key(),
            enumeration.index.lock().len(),
            keep_updated
        );
        Ok(enumeration)
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advance and return the next record's payload
    pub fn next_record(&self) -> Result<Vec<u8>> {
        let session = self.session()?;
        let id = self.index.lock().step_next()?;
        Ok(session.record(id)?.to_vec())
    }

    /// Step back and return the previous record's payload
    pub fn previous_record(&self) -> Result<Vec<u8>> {
        let session = self.session()?;
        let id = self.index.lock().step_previous()?;
        Ok(session.record(id)?.to_vec())
    }

    /// Advance and return the next record's id
    pub fn next_record_id(&self) -> Result<RecordId> {
        self.session()?;
        self.index.lock().step_next()
    }

    /// Step back and return the previous record's id
    pub fn previous_record_id(&self) -> Result<RecordId> {
        self.session()?;
        self.index.lock().step_previous()
    }

    pub fn has_next_element(&self) -> Result<bool> {
        self.session()?;
        Ok(self.index.lock().has_next())
    }

    pub fn has_previous_element(&self) -> Result<bool> {
        self.session()?;
        Ok(self.index.lock().has_previous())
    }

    /// Return the cursor to where it was right after building
    pub fn reset(&self) -> Result<()> {
        self.session()?;
        self.index.lock().reset();
        Ok(())
    }

    /// Number of records currently in the enumeration
    pub fn num_records(&self) -> Result<usize> {
        self.session()?;
        Ok(self.index.lock().len())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Recompute from the store's current records; the cursor restarts
    pub fn rebuild(&self) -> Result<()> {
        let session = self.session()?;
        // Lock order: index, then table
        let mut index = self.index.lock();
        let table = session.table();
        index.rebuild(&table);
        Ok(())
    }

    /// Start or stop following store mutations
    ///
    /// Starting rebuilds first so the index matches the store.
    pub fn keep_updated(&mut self, keep_updated: bool) -> Result<()> {
        let session = self.session()?;

        match (keep_updated, self.live.is_some()) {
            (true, false) => {
                let _write_guard = session.lock_writes();
                self.rebuild()?;
                self.track(&session);
            }
            (false, true) => self.untrack(),
            _ => {}
        }
        Ok(())
    }

    pub fn is_kept_updated(&self) -> Result<bool> {
        self.session()?;
        Ok(self.live.is_some())
    }

    /// Deregister and release; later calls fail with `InvalidState`
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.untrack();
        self.index.lock().clear();
        self.destroyed = true;
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn session(&self) -> Result<Arc<Session>> {
        if self.destroyed {
            return Err(RmsError::InvalidState("enumeration has been destroyed".to_string()));
        }
        let session = self.session.upgrade().ok_or(RmsError::NotOpen)?;
        session.ensure_open()?;
        Ok(session)
    }

    fn track(&mut self, session: &Session) {
        let listener: Arc<dyn RecordListener> = Arc::new(LiveIndex::new(&self.index));
        session.listeners().add(Arc::clone(&listener));
        self.live = Some(listener);
    }

    fn untrack(&mut self) {
        let Some(listener) = self.live.take() else {
            return;
        };
        // A closed session already dropped its listeners
        if let Some(session) = self.session.upgrade() {
            session.listeners().remove(&listener);
        }
    }
}

impl Drop for RecordEnumeration {
    fn drop(&mut self) {
        self.untrack();
    }
}

impl std::fmt::Debug for RecordEnumeration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordEnumeration")
            .field("records", &self.index.lock().len())
            .field("live", &self.live.is_some())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
