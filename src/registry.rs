//! Store Registry
//!
//! Process-wide namespace of record stores.
//!
//! ## Responsibilities
//! - Map (owner, name) → at most one live session
//! - Count opens per session; close the session when the count hits zero
//! - Enforce authorization for cross-suite opens
//! - Create, delete and list stores on the blob backend

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::blob::{BlobStore, FileBlobStore};
use crate::config::Config;
use crate::engine::Session;
use crate::error::{Result, RmsError};
use crate::store::RecordStore;
use crate::table::decode_meta;
use crate::types::{validate_name, AuthMode, OwnerId, StoreKey};

/// The record store namespace
///
/// There is no hidden global: create one registry per process (or per test)
/// and pass it to whoever opens stores. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct StoreRegistry {
    shared: Arc<RegistryShared>,
}

/// Registry state shared with every handle (handles call back on close)
pub(crate) struct RegistryShared {
    config: Config,
    backend: Arc<dyn BlobStore>,
    /// Open sessions and their open counts
    sessions: Mutex<HashMap<StoreKey, OpenSession>>,
}

struct OpenSession {
    session: Arc<Session>,
    open_count: usize,
}

impl StoreRegistry {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const STORES_DIR: &'static str = "stores";

    /// Open a registry over `{data_dir}/stores`
    pub fn open(config: Config) -> Result<Self> {
        let dir = config.data_dir.join(Self::STORES_DIR);
        let backend = FileBlobStore::open(&dir, config.sync_strategy, config.capacity_bytes)?;
        tracing::debug!("Registry opened over {}", backend.dir().display());
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Build a registry over any backend
    pub fn with_backend(config: Config, backend: Arc<dyn BlobStore>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                config,
                backend,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    // =========================================================================
    // Opening
    // =========================================================================

    /// Open (and with `create_if_missing`, create) one of `owner`'s stores
    ///
    /// A store already open for this owner is shared: the new handle joins
    /// the same session and the open count goes up. New stores are private
    /// and read-only to other suites.
    pub fn open_store(&self, owner: &OwnerId, name: &str, create_if_missing: bool) -> Result<RecordStore> {
        let create = create_if_missing.then_some((AuthMode::Private, false));
        self.open_or_create(owner, name, create)
    }

    /// Open or create a store that other suites may share
    ///
    /// `auth_mode` and `writable` apply only when the store is created here;
    /// an existing store keeps the authorization its creator chose. A new
    /// store is persisted with its authorization in a single durable write,
    /// so a failure leaves no store behind.
    pub fn open_shared(
        &self,
        owner: &OwnerId,
        name: &str,
        create_if_missing: bool,
        auth_mode: AuthMode,
        writable: bool,
    ) -> Result<RecordStore> {
        let create = create_if_missing.then_some((auth_mode, writable));
        self.open_or_create(owner, name, create)
    }

    /// Join, load or create a session under one hold of the registry lock
    ///
    /// `create` carries the authorization for a store that does not exist
    /// yet; `None` means missing stores are `NotFound`.
    fn open_or_create(
        &self,
        owner: &OwnerId,
        name: &str,
        create: Option<(AuthMode, bool)>,
    ) -> Result<RecordStore> {
        validate_name(name)?;
        let key = StoreKey::new(owner, name);

        let mut sessions = self.shared.sessions.lock();

        if let Some(entry) = sessions.get_mut(&key) {
            entry.open_count += 1;
            tracing::debug!("Reopened {} (open count {})", key, entry.open_count);
            return Ok(self.handle(Arc::clone(&entry.session), owner));
        }

        let backend = Arc::clone(&self.shared.backend);
        let session = match (Session::load(key.clone(), Arc::clone(&backend))?, create) {
            (Some(session), _) => session,
            (None, Some((auth_mode, writable))) => Session::create(key.clone(), backend, auth_mode, writable)?,
            (None, None) => return Err(RmsError::NotFound { name: name.to_string() }),
        };

        let session = Arc::new(session);
        sessions.insert(
            key,
            OpenSession {
                session: Arc::clone(&session),
                open_count: 1,
            },
        );

        Ok(self.handle(session, owner))
    }

    /// Open a store owned by another suite
    ///
    /// Succeeds when the store's auth mode is `Any`, or when `owner` is the
    /// caller itself (then identical to `open_store(caller, name, false)`).
    pub fn open_by_owner(&self, caller: &OwnerId, owner: &OwnerId, name: &str) -> Result<RecordStore> {
        if caller == owner {
            return self.open_store(caller, name, false);
        }

        validate_name(name)?;
        let key = StoreKey::new(owner, name);

        let mut sessions = self.shared.sessions.lock();

        if let Some(entry) = sessions.get_mut(&key) {
            check_shared(&entry.session, caller)?;
            entry.open_count += 1;
            tracing::debug!("{} joined {} (open count {})", caller, key, entry.open_count);
            return Ok(self.handle(Arc::clone(&entry.session), caller));
        }

        let session = Session::load(key.clone(), Arc::clone(&self.shared.backend))?
            .ok_or_else(|| RmsError::NotFound { name: name.to_string() })?;
        check_shared(&session, caller)?;

        let session = Arc::new(session);
        sessions.insert(
            key,
            OpenSession {
                session: Arc::clone(&session),
                open_count: 1,
            },
        );

        Ok(self.handle(session, caller))
    }

    // =========================================================================
    // Namespace
    // =========================================================================

    /// Delete one of `owner`'s stores
    ///
    /// Fails with `InUse` while any handle is open on it. Listeners are not
    /// notified.
    pub fn delete_store(&self, owner: &OwnerId, name: &str) -> Result<()> {
        validate_name(name)?;
        let key = StoreKey::new(owner, name);

        // Held across the delete so nobody can open the store mid-way
        let sessions = self.shared.sessions.lock();

        if sessions.contains_key(&key) {
            return Err(RmsError::InUse { name: name.to_string() });
        }

        if !self.shared.backend.delete_blob(&key.blob_key())? {
            return Err(RmsError::NotFound { name: name.to_string() });
        }

        tracing::debug!("Deleted record store {}", key);
        Ok(())
    }

    /// Names of `owner`'s stores, ascending; empty when there are none
    ///
    /// Blob keys are digests, so names come from each blob's metadata.
    /// Unreadable blobs are skipped with a warning.
    pub fn list_stores(&self, owner: &OwnerId) -> Result<Vec<String>> {
        let backend = &self.shared.backend;
        let mut names = Vec::new();

        for key in backend.list_blobs(&owner.blob_prefix())? {
            // Deleted since listing
            let Some(blob) = backend.read_blob(&key)? else {
                continue;
            };
            match decode_meta(&blob) {
                Ok(meta) if &meta.owner == owner => names.push(meta.name),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable store blob {}: {}", key, e),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Whether any handle is open on the store
    pub fn is_open(&self, owner: &OwnerId, name: &str) -> bool {
        self.open_count(owner, name) > 0
    }

    /// Number of outstanding opens on the store
    pub fn open_count(&self, owner: &OwnerId, name: &str) -> usize {
        self.shared
            .sessions
            .lock()
            .get(&StoreKey::new(owner, name))
            .map(|entry| entry.open_count)
            .unwrap_or(0)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    fn handle(&self, session: Arc<Session>, caller: &OwnerId) -> RecordStore {
        RecordStore::new(session, Arc::clone(&self.shared), caller.clone())
    }
}

impl RegistryShared {
    /// Return one unit of a session's open count
    ///
    /// At zero the session leaves the registry and is finalized. Lock order:
    /// session write lock → registry map, the same order mutations use when
    /// a listener opens or closes stores from inside a callback.
    pub(crate) fn release(&self, session: &Arc<Session>) -> Result<()> {
        let _write_guard = session.lock_writes();
        let mut sessions = self.sessions.lock();

        let key = session.key();
        let entry = match sessions.get_mut(key) {
            Some(entry) if Arc::ptr_eq(&entry.session, session) => entry,
            _ => return Err(RmsError::NotOpen),
        };

        entry.open_count -= 1;
        if entry.open_count > 0 {
            tracing::debug!("Released {} (open count {})", key, entry.open_count);
            return Ok(());
        }

        sessions.remove(key);
        drop(sessions);

        session.finalize();
        Ok(())
    }
}

fn check_shared(session: &Session, caller: &OwnerId) -> Result<()> {
    let table = session.table();
    let meta = table.meta();
    if meta.auth_mode == AuthMode::Any || &meta.owner == caller {
        Ok(())
    } else {
        Err(RmsError::PermissionDenied(format!(
            "{} is private to {}",
            meta.name, meta.owner
        )))
    }
}
