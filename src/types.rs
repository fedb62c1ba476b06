//! Shared identifiers
//!
//! Owner identity, authorization mode, record ids and the naming rules
//! that every registry call validates.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, RmsError};

/// Identifier of a record within one store. The first record gets 1.
pub type RecordId = u32;

/// Longest permitted store name, in Unicode characters
pub const MAX_NAME_LEN: usize = 32;

// =============================================================================
// Owner Identity
// =============================================================================

/// Identity of the application suite that owns a record store
///
/// Suites are identified by vendor and suite name; two owners may use the
/// same store name and still refer to distinct stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId {
    vendor: String,
    suite: String,
}

impl OwnerId {
    pub fn new(vendor: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            suite: suite.into(),
        }
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Blob key prefix shared by every store this owner holds
    pub(crate) fn blob_prefix(&self) -> String {
        format!("{}-", digest_hex(&[self.vendor.as_str(), self.suite.as_str()], OWNER_DIGEST_BYTES))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor, self.suite)
    }
}

// =============================================================================
// Authorization Mode
// =============================================================================

/// Who may open a record store besides its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMode {
    /// Only the owning suite may open the store
    Private,

    /// Any suite may open the store
    Any,
}

impl TryFrom<i32> for AuthMode {
    type Error = RmsError;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(AuthMode::Private),
            1 => Ok(AuthMode::Any),
            other => Err(RmsError::InvalidArgument(format!(
                "unknown auth mode {}",
                other
            ))),
        }
    }
}

impl From<AuthMode> for i32 {
    fn from(mode: AuthMode) -> Self {
        match mode {
            AuthMode::Private => 0,
            AuthMode::Any => 1,
        }
    }
}

// =============================================================================
// Store Key
// =============================================================================

/// Registry key: a store name scoped to its owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub owner: OwnerId,
    pub name: String,
}

impl StoreKey {
    pub fn new(owner: &OwnerId, name: &str) -> Self {
        Self {
            owner: owner.clone(),
            name: name.to_string(),
        }
    }

    /// Backend key: "{owner digest}-{store digest}", 49 hex characters
    ///
    /// Fixed width whatever the name, so every valid name maps to a portable
    /// file name. The real owner and name live in the persisted metadata.
    pub fn blob_key(&self) -> String {
        let store = digest_hex(
            &[self.owner.vendor(), self.owner.suite(), self.name.as_str()],
            STORE_DIGEST_BYTES,
        );
        format!("{}{}", self.owner.blob_prefix(), store)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.name)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Check a store name is 1..=32 Unicode characters
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(RmsError::InvalidName { len });
    }
    Ok(())
}

/// Current wall-clock time in unix milliseconds
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Owner part of a blob key (64 bits)
const OWNER_DIGEST_BYTES: usize = 8;

/// Store part of a blob key (128 bits)
const STORE_DIGEST_BYTES: usize = 16;

/// Truncated SHA-256 over length-prefixed parts, hex encoded
fn digest_hex(parts: &[&str], len: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex_encode(&hasher.finalize()[..len])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
