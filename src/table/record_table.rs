//! Record table implementation
//!
//! BTreeMap-based table; ids are handed out from a monotonic counter.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RmsError};
use crate::types::{now_millis, AuthMode, OwnerId, RecordId};

/// Per-store metadata, persisted alongside the records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub name: String,
    pub owner: OwnerId,
    pub auth_mode: AuthMode,
    /// Whether suites other than the owner may mutate records
    pub writable: bool,
    /// Bumped by every record mutation
    pub version: u64,
    /// Id the next added record receives; never decreases
    pub next_record_id: RecordId,
    /// Unix millis of the last record mutation
    pub last_modified: u64,
}

impl StoreMeta {
    /// Metadata for a freshly created store
    pub fn new(owner: &OwnerId, name: &str, auth_mode: AuthMode, writable: bool) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.clone(),
            auth_mode,
            writable,
            version: 0,
            next_record_id: 1,
            last_modified: now_millis(),
        }
    }
}

/// A change applied to the table but not yet known to be durable
///
/// Hand it back to `RecordTable::rollback` if persisting fails.
#[derive(Debug)]
pub struct Staged {
    prior_meta: StoreMeta,
    undo: Undo,
}

#[derive(Debug)]
enum Undo {
    Added(RecordId),
    Replaced(RecordId, Bytes),
    Removed(RecordId, Bytes),
    MetaOnly,
}

/// In-memory image of one record store
#[derive(Debug, Clone)]
pub struct RecordTable {
    meta: StoreMeta,
    records: BTreeMap<RecordId, Bytes>,
    /// Sum of payload lengths
    data_size: usize,
}

impl RecordTable {
    /// Create an empty table
    pub fn new(meta: StoreMeta) -> Self {
        Self {
            meta,
            records: BTreeMap::new(),
            data_size: 0,
        }
    }

    /// Rebuild a table from decoded parts
    pub fn from_parts(meta: StoreMeta, records: BTreeMap<RecordId, Bytes>) -> Self {
        let data_size = records.values().map(|r| r.len()).sum();
        Self {
            meta,
            records,
            data_size,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    pub fn get(&self, id: RecordId) -> Option<&Bytes> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total payload bytes (no overhead)
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Records in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Bytes)> + '_ {
        self.records.iter().map(|(id, data)| (*id, data))
    }

    // =========================================================================
    // Staged Mutations
    // =========================================================================

    /// Insert a record under the next id
    ///
    /// Fails with `Full` once the id space is exhausted; ids are never reused.
    pub fn stage_add(&mut self, data: Bytes) -> Result<(RecordId, Staged)> {
        let id = self.meta.next_record_id;
        let next = id.checked_add(1).ok_or(RmsError::Full {
            requested: data.len() as u64,
            available: 0,
        })?;

        let prior_meta = self.meta.clone();
        self.data_size += data.len();
        self.records.insert(id, data);
        self.meta.next_record_id = next;
        self.touch();

        Ok((
            id,
            Staged {
                prior_meta,
                undo: Undo::Added(id),
            },
        ))
    }

    /// Replace the payload of an existing record
    pub fn stage_set(&mut self, id: RecordId, data: Bytes) -> Result<Staged> {
        if !self.records.contains_key(&id) {
            return Err(RmsError::InvalidId(id));
        }

        let prior_meta = self.meta.clone();
        self.data_size += data.len();
        let previous = self
            .records
            .insert(id, data)
            .ok_or(RmsError::InvalidId(id))?;
        self.data_size -= previous.len();
        self.touch();

        Ok(Staged {
            prior_meta,
            undo: Undo::Replaced(id, previous),
        })
    }

    /// Remove a record; its id stays retired
    pub fn stage_delete(&mut self, id: RecordId) -> Result<Staged> {
        let prior_meta = self.meta.clone();
        let previous = self.records.remove(&id).ok_or(RmsError::InvalidId(id))?;
        self.data_size -= previous.len();
        self.touch();

        Ok(Staged {
            prior_meta,
            undo: Undo::Removed(id, previous),
        })
    }

    /// Change authorization; not a record mutation, so version is untouched
    pub fn stage_mode(&mut self, auth_mode: AuthMode, writable: bool) -> Staged {
        let prior_meta = self.meta.clone();
        self.meta.auth_mode = auth_mode;
        self.meta.writable = writable;

        Staged {
            prior_meta,
            undo: Undo::MetaOnly,
        }
    }

    /// Undo a staged change, restoring records and metadata exactly
    pub fn rollback(&mut self, staged: Staged) {
        match staged.undo {
            Undo::Added(id) => {
                if let Some(data) = self.records.remove(&id) {
                    self.data_size -= data.len();
                }
            }
            Undo::Replaced(id, previous) | Undo::Removed(id, previous) => {
                self.data_size += previous.len();
                if let Some(current) = self.records.insert(id, previous) {
                    self.data_size -= current.len();
                }
            }
            Undo::MetaOnly => {}
        }
        self.meta = staged.prior_meta;
    }

    fn touch(&mut self) {
        self.meta.version += 1;
        self.meta.last_modified = now_millis();
    }
}
