//! Record store handles
//!
//! A `RecordStore` is one caller's open reference on a store session. Every
//! successful open returns a new handle carrying one unit of the session's
//! open count; `close` (or dropping the handle) gives that unit back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::engine::Session;
use crate::enumeration::{RecordComparator, RecordEnumeration, RecordFilter};
use crate::error::{Result, RmsError};
use crate::listener::RecordListener;
use crate::registry::RegistryShared;
use crate::types::{AuthMode, OwnerId, RecordId};

/// An open handle on a record store
///
/// All handles opened on the same `(owner, name)` share one session, so a
/// write through one is immediately visible through the others. Operations
/// fail with `RmsError::NotOpen` once the session has fully closed.
pub struct RecordStore {
    session: Arc<Session>,
    registry: Arc<RegistryShared>,
    /// Identity of the suite that opened this handle
    caller: OwnerId,
    /// Set once this handle's open count contribution was returned
    released: AtomicBool,
}

impl RecordStore {
    pub(crate) fn new(session: Arc<Session>, registry: Arc<RegistryShared>, caller: OwnerId) -> Self {
        Self {
            session,
            registry,
            caller,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Name of this store
    pub fn name(&self) -> Result<String> {
        self.session.read(|t| t.meta().name.clone())
    }

    /// Suite that owns this store
    pub fn owner(&self) -> Result<OwnerId> {
        self.session.read(|t| t.meta().owner.clone())
    }

    /// Suite this handle was opened by
    pub fn caller(&self) -> &OwnerId {
        &self.caller
    }

    pub fn auth_mode(&self) -> Result<AuthMode> {
        self.session.read(|t| t.meta().auth_mode)
    }

    /// Whether suites other than the owner may mutate records
    pub fn is_writable(&self) -> Result<bool> {
        self.session.read(|t| t.meta().writable)
    }

    /// Version, bumped by every record mutation
    pub fn version(&self) -> Result<u64> {
        self.session.read(|t| t.meta().version)
    }

    pub fn num_records(&self) -> Result<usize> {
        self.session.read(|t| t.len())
    }

    /// Bytes the store occupies on the backend, overhead included
    pub fn size(&self) -> Result<u64> {
        self.session.ensure_open()?;
        Ok(self.session.persisted_size())
    }

    /// Bytes the backend can still take
    pub fn size_available(&self) -> Result<u64> {
        self.session.size_available()
    }

    /// Unix millis of the last record mutation
    pub fn last_modified(&self) -> Result<u64> {
        self.session.read(|t| t.meta().last_modified)
    }

    /// Id the next `add_record` will return; stale after any add
    pub fn next_record_id(&self) -> Result<RecordId> {
        self.session.read(|t| t.meta().next_record_id)
    }

    /// Whether the underlying session is still open
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Add a record; returns once it is durable
    pub fn add_record(&self, data: &[u8]) -> Result<RecordId> {
        self.session
            .add_record(self, &self.caller, Bytes::copy_from_slice(data))
    }

    /// Add `num_bytes` of `data` starting at `offset`
    pub fn add_record_range(&self, data: &[u8], offset: usize, num_bytes: usize) -> Result<RecordId> {
        self.add_record(checked_range(data, offset, num_bytes)?)
    }

    /// Replace the payload of an existing record
    pub fn set_record(&self, id: RecordId, data: &[u8]) -> Result<()> {
        self.session
            .set_record(self, &self.caller, id, Bytes::copy_from_slice(data))
    }

    /// Replace a record with `num_bytes` of `data` starting at `offset`
    pub fn set_record_range(
        &self,
        id: RecordId,
        data: &[u8],
        offset: usize,
        num_bytes: usize,
    ) -> Result<()> {
        self.set_record(id, checked_range(data, offset, num_bytes)?)
    }

    /// Delete a record; its id is never handed out again
    pub fn delete_record(&self, id: RecordId) -> Result<()> {
        self.session.delete_record(self, &self.caller, id)
    }

    /// Copy of a record's payload
    pub fn get_record(&self, id: RecordId) -> Result<Vec<u8>> {
        Ok(self.session.record(id)?.to_vec())
    }

    /// Copy a record into `buffer` at `offset`, returns the bytes copied
    pub fn get_record_into(&self, id: RecordId, buffer: &mut [u8], offset: usize) -> Result<usize> {
        let data = self.session.record(id)?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| {
                RmsError::InvalidArgument(format!(
                    "record {} ({} bytes) does not fit in buffer of {} at offset {}",
                    id,
                    data.len(),
                    buffer.len(),
                    offset
                ))
            })?;
        buffer[offset..end].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Payload length of a record
    pub fn record_size(&self, id: RecordId) -> Result<usize> {
        Ok(self.session.record(id)?.len())
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener; adding the same `Arc` twice has no effect
    pub fn add_record_listener(&self, listener: Arc<dyn RecordListener>) {
        self.session.listeners().add(listener);
    }

    /// Deregister a listener; unknown listeners are ignored
    pub fn remove_record_listener(&self, listener: &Arc<dyn RecordListener>) {
        self.session.listeners().remove(listener);
    }

    // =========================================================================
    // Sharing, Enumeration, Lifecycle
    // =========================================================================

    /// Change who may open and write this store; owner only
    pub fn set_mode(&self, auth_mode: AuthMode, writable: bool) -> Result<()> {
        self.session.set_mode(&self.caller, auth_mode, writable)
    }

    /// Enumerate records matching `filter`, ordered by `comparator`
    ///
    /// With `keep_updated` the enumeration follows every later mutation;
    /// otherwise it is a snapshot of ids (payloads are still read live).
    pub fn enumerate_records(
        &self,
        filter: Option<Box<dyn RecordFilter>>,
        comparator: Option<Box<dyn RecordComparator>>,
        keep_updated: bool,
    ) -> Result<RecordEnumeration> {
        RecordEnumeration::new(&self.session, filter, comparator, keep_updated)
    }

    /// Give back this handle's share of the open count
    ///
    /// The store really closes when the count reaches zero: listeners are
    /// dropped and enumerations become invalid. Closing a handle twice
    /// fails with `NotOpen`.
    pub fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(RmsError::NotOpen);
        }
        self.registry.release(&self.session)
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.registry.release(&self.session) {
                tracing::debug!("Releasing dropped handle on {} failed: {}", self.session.key(), e);
            }
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("store", self.session.key())
            .field("caller", &self.caller)
            .field("open", &self.session.is_open())
            .finish()
    }
}

fn checked_range(data: &[u8], offset: usize, num_bytes: usize) -> Result<&[u8]> {
    offset
        .checked_add(num_bytes)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            RmsError::InvalidArgument(format!(
                "range {}+{} outside buffer of {} bytes",
                offset,
                num_bytes,
                data.len()
            ))
        })
}
