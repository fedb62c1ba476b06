//! File Blob Store
//!
//! One file per blob, replaced via write-temp → fsync → rename → fsync dir.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{Result, RmsError};

use super::BlobStore;

/// Persistent blob storage in a directory
///
/// ## Concurrency:
/// - `write_guard`: serializes replaces and deletes so capacity checks see
///   a stable total; reads go straight to the file system
/// - Each committed file is only ever replaced by rename, so a concurrent
///   reader sees either the old or the new contents
pub struct FileBlobStore {
    /// Directory holding the blob files
    dir: PathBuf,

    /// fsync policy for replaces
    sync_strategy: SyncStrategy,

    /// Capacity limit across all blobs (bytes)
    capacity: u64,

    /// Serializes mutations of the directory
    write_guard: Mutex<()>,
}

impl FileBlobStore {
    const BLOB_EXT: &'static str = "rms";
    const TEMP_SUFFIX: &'static str = ".tmp";

    /// Open or create a blob directory
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Remove temp files left behind by an interrupted replace
    pub fn open(dir: &Path, sync_strategy: SyncStrategy, capacity: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut recovered = 0usize;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && Self::is_temp_file(&path) {
                tracing::warn!("Removing interrupted blob write: {}", path.display());
                fs::remove_file(&path)?;
                recovered += 1;
            }
        }

        if recovered > 0 {
            Self::sync_dir_at(dir)?;
        }

        tracing::debug!("Blob store opened at {} (capacity {} bytes)", dir.display(), capacity);

        Ok(Self {
            dir: dir.to_path_buf(),
            sync_strategy,
            capacity,
            write_guard: Mutex::new(()),
        })
    }

    /// Get the blob directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// "abc" → {dir}/abc.rms
    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, Self::BLOB_EXT))
    }

    /// "abc" → {dir}/abc.rms.tmp
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", key, Self::BLOB_EXT, Self::TEMP_SUFFIX))
    }

    /// "{dir}/abc.rms" → Some("abc")
    fn parse_key(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != Self::BLOB_EXT {
            return None;
        }
        Some(path.file_stem()?.to_str()?.to_string())
    }

    fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(Self::TEMP_SUFFIX))
            .unwrap_or(false)
    }

    fn file_len(path: &Path) -> Result<u64> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn used_bytes_unlocked(&self) -> Result<u64> {
        let mut total = 0u64;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && Self::parse_key(&path).is_some() {
                total += Self::file_len(&path)?;
            }
        }
        Ok(total)
    }

    fn sync_dir(&self) -> Result<()> {
        match self.sync_strategy {
            SyncStrategy::Full => Self::sync_dir_at(&self.dir),
            SyncStrategy::DataOnly => Ok(()),
        }
    }

    /// fsync the directory so renames and unlinks are durable
    #[cfg(unix)]
    fn sync_dir_at(dir: &Path) -> Result<()> {
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir_at(_dir: &Path) -> Result<()> {
        // NTFS journals metadata; directory handles cannot be fsynced
        Ok(())
    }
}

impl BlobStore for FileBlobStore {
    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.blob_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_blob(&self, key: &str, data: &[u8]) -> Result<()> {
        let _guard = self.write_guard.lock();

        let path = self.blob_path(key);

        // Step 1: Capacity check against the total after replacing this blob
        let used = self.used_bytes_unlocked()?;
        let existing = Self::file_len(&path)?;
        let available = self.capacity.saturating_sub(used.saturating_sub(existing));
        if data.len() as u64 > available {
            return Err(RmsError::Full {
                requested: data.len() as u64,
                available,
            });
        }

        // Step 2: Write and fsync the temp file
        let temp = self.temp_path(key);
        if let Err(e) = Self::write_synced(&temp, data) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        // Step 3: Atomic rename over the committed blob
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        // Step 4: Make the rename itself durable
        self.sync_dir()?;

        tracing::trace!("Wrote blob {} ({} bytes)", key, data.len());
        Ok(())
    }

    fn delete_blob(&self, key: &str) -> Result<bool> {
        let _guard = self.write_guard.lock();

        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => {
                self.sync_dir()?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(key) = Self::parse_key(&path) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn used_bytes(&self) -> Result<u64> {
        self.used_bytes_unlocked()
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
