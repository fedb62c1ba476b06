//! Record table codec
//!
//! Encodes a whole table into one checksummed blob and back.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RmsError};
use crate::types::RecordId;

use super::{RecordTable, StoreMeta};

/// Magic bytes identifying an AtlasRMS store blob
pub const MAGIC: &[u8; 4] = b"ARMS";

/// Current blob format version
pub const FORMAT_VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + PayloadLen (4) + PayloadCRC (4) = 14 bytes
pub const HEADER_SIZE: usize = 14;

/// Borrowed view used for encoding (avoids cloning payloads)
#[derive(Serialize)]
struct PersistedTableRef<'a> {
    meta: &'a StoreMeta,
    records: Vec<(RecordId, &'a [u8])>,
}

/// Owned form produced by decoding
#[derive(Deserialize)]
struct PersistedTable {
    meta: StoreMeta,
    records: Vec<(RecordId, Vec<u8>)>,
}

/// Leading field of the payload; the records that follow are not read
#[derive(Deserialize)]
struct PersistedMeta {
    meta: StoreMeta,
}

/// Encode a table to blob bytes
///
/// Format: magic (4) + version (2) + payload_len (4) + crc (4) + payload
pub fn encode_table(table: &RecordTable) -> Result<Vec<u8>> {
    let persisted = PersistedTableRef {
        meta: table.meta(),
        records: table.iter().map(|(id, data)| (id, data.as_ref())).collect(),
    };

    let payload = bincode::serialize(&persisted)
        .map_err(|e| RmsError::Serialization(format!("Failed to encode table: {}", e)))?;

    let payload_len = u32::try_from(payload.len()).map_err(|_| RmsError::Full {
        requested: payload.len() as u64,
        available: u32::MAX as u64,
    })?;

    let mut blob = Vec::with_capacity(HEADER_SIZE + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&payload_len.to_le_bytes());
    blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    blob.extend_from_slice(&payload);

    Ok(blob)
}

/// Decode blob bytes into a table, validating header and checksum
pub fn decode_table(bytes: &[u8]) -> Result<RecordTable> {
    let payload = checked_payload(bytes)?;

    let persisted: PersistedTable = bincode::deserialize(payload)
        .map_err(|e| RmsError::Serialization(format!("Failed to decode table: {}", e)))?;

    let records: BTreeMap<RecordId, Bytes> = persisted
        .records
        .into_iter()
        .map(|(id, data)| (id, Bytes::from(data)))
        .collect();

    if let Some(&max_id) = records.keys().next_back() {
        if max_id >= persisted.meta.next_record_id {
            return Err(RmsError::Corruption(format!(
                "Record id {} not below next id {}",
                max_id, persisted.meta.next_record_id
            )));
        }
    }

    Ok(RecordTable::from_parts(persisted.meta, records))
}

/// Decode only the metadata of a blob (header and checksum still validated)
pub fn decode_meta(bytes: &[u8]) -> Result<StoreMeta> {
    let payload = checked_payload(bytes)?;
    let persisted: PersistedMeta = bincode::deserialize(payload)
        .map_err(|e| RmsError::Serialization(format!("Failed to decode store metadata: {}", e)))?;
    Ok(persisted.meta)
}

/// Validate the header and return the payload it covers
fn checked_payload(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < HEADER_SIZE {
        return Err(RmsError::Corruption(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(RmsError::Corruption(format!(
            "Invalid store magic: expected ARMS, got {:?}",
            &bytes[0..4]
        )));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(RmsError::Corruption(format!(
            "Unsupported store format version: {}",
            version
        )));
    }

    let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let expected_crc = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(RmsError::Corruption(format!(
            "Payload length mismatch: header says {}, found {}",
            payload_len,
            payload.len()
        )));
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(RmsError::Corruption(format!(
            "Checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    Ok(payload)
}
