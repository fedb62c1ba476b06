//! Blob Storage Module
//!
//! Durable byte-array storage keyed by an opaque string handle.
//!
//! ## Responsibilities
//! - Whole-blob atomic replace: a reader sees the old or the new bytes, never a mix
//! - A write returns only once the bytes are durable
//! - Capacity accounting so the engine can report `Full` and space available
//! - Prefix listing for per-owner store discovery
//!
//! Backends do not interpret blob contents; the record table codec owns the format.
//!
//! ## On-Disk Layout (FileBlobStore)
//! ```text
//! {data_dir}/stores/
//!   ├── <key>.rms        (committed blob)
//!   └── <key>.rms.tmp    (in-flight replace, removed on next open)
//! ```

mod file;
mod memory;

pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::Result;

/// Durable blob storage used by the record store engine
///
/// ## Invariants
/// - `write_blob` is all-or-nothing and durable when it returns `Ok`
/// - `write_blob` fails with `RmsError::Full` when the new total would exceed `capacity()`
/// - `read_blob` returns exactly the bytes of the last successful write
pub trait BlobStore: Send + Sync {
    /// Read a whole blob, `None` if it does not exist
    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically replace (or create) a blob
    fn write_blob(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete a blob, returns whether it existed
    fn delete_blob(&self, key: &str) -> Result<bool>;

    /// Keys of all blobs starting with `prefix`, in ascending order
    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>>;

    /// Total bytes currently held
    fn used_bytes(&self) -> Result<u64>;

    /// Maximum total bytes this backend accepts
    fn capacity(&self) -> u64;
}
