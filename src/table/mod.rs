//! Record Table Module
//!
//! In-memory image of one record store plus its persisted encoding.
//!
//! ## Responsibilities
//! - Map record id → payload bytes, ordered by id
//! - Own the per-store metadata (version, timestamps, next-id counter, authorization)
//! - Stage a mutation so it can be undone if the durable write fails
//! - Encode/decode the whole table as a single backend blob
//!
//! ## Blob Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                            │
//! │   Magic: "ARMS" (4) | Version: u16 (2)                       │
//! │   PayloadLen: u32 (4) | PayloadCRC: u32 (4)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                            │
//! │   meta: {name, owner, auth_mode, writable, version,          │
//! │          next_record_id, last_modified}                      │
//! │   records: [(id, bytes)] ascending by id                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod record_table;

pub use codec::{decode_meta, decode_table, encode_table, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use record_table::{RecordTable, Staged, StoreMeta};
