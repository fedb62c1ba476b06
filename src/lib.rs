//! # AtlasRMS
//!
//! An embedded persistent record store with:
//! - Named stores of variable-length binary records, one namespace per suite
//! - Durable, atomic mutations (a failed write leaves no trace)
//! - Synchronous change listeners
//! - Filtered, sorted, bidirectional enumerations that can follow mutations
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StoreRegistry                            │
//! │        (owner, name) → session, open counts, auth            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ RecordStore handles
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Session                                 │
//! │      (Re-entrant write lock / RwLock table / listeners)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────────┐
//!   │ RecordTable │          │ RecordEnumeration│
//!   │ (staged,    │◄─────────│ (OrderedIndex,   │
//!   │  rollback)  │  reads   │  live listener)  │
//!   └──────┬──────┘          └─────────────────┘
//!          │ encode (ARMS header + bincode)
//!          ▼
//!   ┌─────────────┐
//!   │  BlobStore  │
//!   │ (file/mem)  │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;

pub mod blob;
pub mod table;
pub mod listener;
pub mod enumeration;
mod engine;
pub mod store;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, RmsError};
pub use config::{Config, SyncStrategy};
pub use types::{AuthMode, OwnerId, RecordId, MAX_NAME_LEN};
pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use listener::{RecordEvent, RecordListener};
pub use enumeration::{RecordComparator, RecordEnumeration, RecordFilter};
pub use store::RecordStore;
pub use registry::StoreRegistry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasRMS
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
