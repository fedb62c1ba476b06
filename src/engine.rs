//! Engine Module
//!
//! The per-store session that every handle on an open store shares.
//!
//! ## Responsibilities
//! - Hold the single in-memory record table of an open store
//! - Make each mutation durable before it becomes visible to the caller
//! - Roll the table back when the durable write fails
//! - Fan mutation events out to registered listeners

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard};

use crate::blob::BlobStore;
use crate::error::{Result, RmsError};
use crate::listener::{ListenerSet, RecordEvent};
use crate::store::RecordStore;
use crate::table::{decode_table, encode_table, RecordTable, Staged, StoreMeta};
use crate::types::{AuthMode, OwnerId, RecordId, StoreKey};

/// The shared state of one open record store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (add/set/delete/set_mode/close): Serialized by `write_lock`
///   - Only ONE durable mutation per store at a time
///   - Held across the blob write AND listener dispatch
///   - Re-entrant, so a listener may call back into the store
///
/// - **Reads** (get/accessors/enumeration): `table` read lock only
///   - `table` is write-locked just while a change is staged and persisted,
///     so readers never observe a half-applied mutation
pub(crate) struct Session {
    /// Owner + name this session serves
    key: StoreKey,

    /// Backend key of the persisted table
    blob_key: String,

    /// Durable storage
    backend: Arc<dyn BlobStore>,

    /// Serializes durable mutations and their listener dispatch
    write_lock: ReentrantMutex<()>,

    /// In-memory record table
    table: RwLock<RecordTable>,

    /// Byte size of the blob last written or loaded
    persisted_size: AtomicU64,

    /// Registered listeners, cleared on final close
    listeners: ListenerSet,

    /// False once the last handle has closed
    open: AtomicBool,
}

impl Session {
    /// Create a brand-new store and persist its empty table
    pub fn create(
        key: StoreKey,
        backend: Arc<dyn BlobStore>,
        auth_mode: AuthMode,
        writable: bool,
    ) -> Result<Self> {
        let meta = StoreMeta::new(&key.owner, &key.name, auth_mode, writable);
        let table = RecordTable::new(meta);
        let blob_key = key.blob_key();

        let blob = encode_table(&table)?;
        backend.write_blob(&blob_key, &blob)?;

        tracing::debug!("Created record store {}", key);

        Ok(Self::from_table(key, blob_key, backend, table, blob.len() as u64))
    }

    /// Load an existing store; `None` if the backend has no blob for it
    pub fn load(key: StoreKey, backend: Arc<dyn BlobStore>) -> Result<Option<Self>> {
        let blob_key = key.blob_key();
        let blob = match backend.read_blob(&blob_key)? {
            Some(blob) => blob,
            None => return Ok(None),
        };

        let table = decode_table(&blob)?;
        let meta = table.meta();
        if meta.name != key.name || meta.owner != key.owner {
            return Err(RmsError::Corruption(format!(
                "Blob {} holds store {}:{}, expected {}",
                blob_key, meta.owner, meta.name, key
            )));
        }

        tracing::debug!(
            "Loaded record store {} ({} records, version {})",
            key,
            table.len(),
            meta.version
        );

        Ok(Some(Self::from_table(key, blob_key, backend, table, blob.len() as u64)))
    }

    fn from_table(
        key: StoreKey,
        blob_key: String,
        backend: Arc<dyn BlobStore>,
        table: RecordTable,
        persisted_size: u64,
    ) -> Self {
        Self {
            key,
            blob_key,
            backend,
            write_lock: ReentrantMutex::new(()),
            table: RwLock::new(table),
            persisted_size: AtomicU64::new(persisted_size),
            listeners: ListenerSet::new(),
            open: AtomicBool::new(true),
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(RmsError::NotOpen)
        }
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Acquire the mutation lock (close finalization, live enumeration setup)
    pub fn lock_writes(&self) -> ReentrantMutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Mark the session closed, drop every listener and release the records
    ///
    /// Caller must hold the write lock. Live enumerations notice through
    /// `is_open` and fail from now on.
    pub fn finalize(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.listeners.clear();

        let mut table = self.table.write();
        let meta = table.meta().clone();
        *table = RecordTable::new(meta);
        drop(table);

        tracing::debug!("Closed record store {}", self.key);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Run `f` against a consistent view of the table
    pub fn read<T>(&self, f: impl FnOnce(&RecordTable) -> T) -> Result<T> {
        self.ensure_open()?;
        Ok(f(&self.table.read()))
    }

    /// Read guard without the open check (listener dispatch, enumeration internals)
    pub fn table(&self) -> RwLockReadGuard<'_, RecordTable> {
        self.table.read()
    }

    /// Live payload of a record
    pub fn record(&self, id: RecordId) -> Result<Bytes> {
        self.read(|table| table.get(id).cloned())?
            .ok_or(RmsError::InvalidId(id))
    }

    pub fn persisted_size(&self) -> u64 {
        self.persisted_size.load(Ordering::SeqCst)
    }

    /// Bytes the backend can still take
    pub fn size_available(&self) -> Result<u64> {
        self.ensure_open()?;
        let used = self.backend.used_bytes()?;
        Ok(self.backend.capacity().saturating_sub(used))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a record and notify listeners
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Stage the record under the next id
    /// 3. Persist the whole table (rolled back on failure)
    /// 4. Dispatch "added"
    pub fn add_record(&self, store: &RecordStore, caller: &OwnerId, data: Bytes) -> Result<RecordId> {
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        let id = self.commit(|table| {
            check_write_access(table.meta(), caller)?;
            table.stage_add(data)
        })?;

        tracing::trace!("Added record {} to {}", id, self.key);
        self.listeners.dispatch(store, RecordEvent::Added(id));
        Ok(id)
    }

    /// Replace a record's payload and notify listeners
    pub fn set_record(
        &self,
        store: &RecordStore,
        caller: &OwnerId,
        id: RecordId,
        data: Bytes,
    ) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        self.commit(|table| {
            check_write_access(table.meta(), caller)?;
            Ok(((), table.stage_set(id, data)?))
        })?;

        tracing::trace!("Changed record {} in {}", id, self.key);
        self.listeners.dispatch(store, RecordEvent::Changed(id));
        Ok(())
    }

    /// Delete a record and notify listeners
    pub fn delete_record(&self, store: &RecordStore, caller: &OwnerId, id: RecordId) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        self.commit(|table| {
            check_write_access(table.meta(), caller)?;
            Ok(((), table.stage_delete(id)?))
        })?;

        tracing::trace!("Deleted record {} from {}", id, self.key);
        self.listeners.dispatch(store, RecordEvent::Deleted(id));
        Ok(())
    }

    /// Change authorization; only the owner may
    pub fn set_mode(&self, caller: &OwnerId, auth_mode: AuthMode, writable: bool) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        self.commit(|table| {
            if &table.meta().owner != caller {
                return Err(RmsError::PermissionDenied(format!(
                    "{} may not change the mode of a store owned by {}",
                    caller,
                    table.meta().owner
                )));
            }
            Ok(((), table.stage_mode(auth_mode, writable)))
        })?;

        tracing::debug!(
            "Set mode of {} to {:?} (writable: {})",
            self.key,
            auth_mode,
            writable
        );
        Ok(())
    }

    /// Internal commit (called with write lock held)
    ///
    /// Stages a change, persists the resulting table and only then lets it
    /// stand; any failure restores the exact prior table.
    fn commit<T>(&self, stage: impl FnOnce(&mut RecordTable) -> Result<(T, Staged)>) -> Result<T> {
        let mut table = self.table.write();
        let (value, staged) = stage(&mut table)?;

        let blob = match encode_table(&table) {
            Ok(blob) => blob,
            Err(e) => {
                table.rollback(staged);
                return Err(e);
            }
        };

        if let Err(e) = self.backend.write_blob(&self.blob_key, &blob) {
            tracing::debug!("Persisting {} failed, rolling back: {}", self.key, e);
            table.rollback(staged);
            return Err(e);
        }

        self.persisted_size.store(blob.len() as u64, Ordering::SeqCst);
        Ok(value)
    }
}

/// Owners always write; other suites only when the store is writable
fn check_write_access(meta: &StoreMeta, caller: &OwnerId) -> Result<()> {
    if &meta.owner == caller || meta.writable {
        Ok(())
    } else {
        Err(RmsError::PermissionDenied(format!(
            "{} has read-only access to {}",
            caller, meta.name
        )))
    }
}
