//! In-memory blob store for tests and benchmarks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, RmsError};

use super::BlobStore;

/// Blob storage held in a map; nothing survives the process
///
/// Supports failure injection: `fail_writes_after(n)` lets `n` more writes
/// succeed and fails every write after that with an I/O error, which is how
/// tests exercise rollback paths.
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    capacity: u64,
    /// Remaining successful writes, `None` means unlimited
    write_budget: Mutex<Option<usize>>,
    /// Successful writes so far
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    /// Create an empty store with effectively unlimited capacity
    pub fn new() -> Self {
        Self::with_capacity(u64::MAX)
    }

    /// Create an empty store that holds at most `capacity` bytes
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            capacity,
            write_budget: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// Allow `n` more writes, then fail every write with an I/O error
    pub fn fail_writes_after(&self, n: usize) {
        *self.write_budget.lock() = Some(n);
    }

    /// Clear any injected failure
    pub fn heal(&self) {
        *self.write_budget.lock() = None;
    }

    /// Number of blobs held
    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }

    /// Number of writes that have succeeded
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_write_budget(&self) -> Result<()> {
        let mut budget = self.write_budget.lock();
        match budget.as_mut() {
            Some(0) => Err(RmsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            ))),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn write_blob(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.write();

        let used: u64 = blobs.values().map(|b| b.len() as u64).sum();
        let existing = blobs.get(key).map(|b| b.len() as u64).unwrap_or(0);
        let available = self.capacity.saturating_sub(used - existing);
        if data.len() as u64 > available {
            return Err(RmsError::Full {
                requested: data.len() as u64,
                available,
            });
        }

        self.take_write_budget()?;
        blobs.insert(key.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_blob(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.write().remove(key).is_some())
    }

    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn used_bytes(&self) -> Result<u64> {
        Ok(self.blobs.read().values().map(|b| b.len() as u64).sum())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
