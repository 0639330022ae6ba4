// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache entry and the persistent-tier record codec.
//!
//! Each persisted record is a single file: a little-endian `u32` header
//! length, a JSON header, then the raw payload bytes. The header carries the
//! logical key, write time, expiry, and free-form metadata; the payload is
//! never interpreted.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// On-disk record format version. Bumping this invalidates existing records
/// (they decode as corrupt and are deleted on discovery).
pub const RECORD_VERSION: u32 = 1;

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Options for [`TieredCache::store_with`](crate::TieredCache::store_with).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use satchel_sync::StoreOptions;
///
/// let opts = StoreOptions::new()
///     .ttl(Duration::from_secs(60))
///     .metadata("content-type", "application/pdf");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Time-to-live; overrides the configured default. `None` falls back to
    /// the config default.
    pub ttl: Option<Duration>,
    /// Free-form tags stored alongside the payload, never interpreted.
    pub metadata: Option<HashMap<String, String>>,
}

impl StoreOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A cached entry: opaque payload plus expiry and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Opaque content, owned by the tier holding it
    pub payload: Vec<u8>,
    /// Epoch millis of the last explicit store (trim ordering key)
    pub stored_at_ms: i64,
    /// Absolute expiration in epoch millis; `None` never expires
    pub expires_at_ms: Option<i64>,
    /// Free-form tags (e.g. content type)
    pub metadata: Option<HashMap<String, String>>,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    #[must_use]
    pub fn new(payload: Vec<u8>, ttl: Option<Duration>) -> Self {
        let stored_at_ms = now_ms();
        Self {
            payload,
            stored_at_ms,
            expires_at_ms: ttl.map(|t| stored_at_ms.saturating_add(t.as_millis() as i64)),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Option<HashMap<String, String>>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the entry is logically dead at `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|e| now_ms > e)
    }
}

/// Record header persisted ahead of the payload bytes.
#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    version: u32,
    key: String,
    stored_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<HashMap<String, String>>,
}

/// A persisted record that failed to decode. Treated as corruption: the
/// caller deletes the file and reports a miss.
#[derive(Debug, thiserror::Error)]
#[error("corrupt cache record: {0}")]
pub struct DecodeError(pub String);

/// Encode a record for the persistent tier.
pub fn encode_record(key: &str, entry: &CacheEntry) -> Result<Vec<u8>, serde_json::Error> {
    let header = RecordHeader {
        version: RECORD_VERSION,
        key: key.to_string(),
        stored_at_ms: entry.stored_at_ms,
        expires_at_ms: entry.expires_at_ms,
        metadata: entry.metadata.clone(),
    };
    let header_bytes = serde_json::to_vec(&header)?;
    let mut buf = Vec::with_capacity(4 + header_bytes.len() + entry.payload.len());
    buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&entry.payload);
    Ok(buf)
}

/// Decode a persistent-tier record. Any framing or header failure is
/// corruption, never an I/O retry.
pub fn decode_record(bytes: &[u8]) -> Result<CacheEntry, DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError("record shorter than length prefix".into()));
    }
    let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload_start = 4usize
        .checked_add(header_len)
        .ok_or_else(|| DecodeError("header length overflow".into()))?;
    if bytes.len() < payload_start {
        return Err(DecodeError(format!(
            "header length {} exceeds record size {}",
            header_len,
            bytes.len()
        )));
    }
    let header: RecordHeader = serde_json::from_slice(&bytes[4..payload_start])
        .map_err(|e| DecodeError(format!("bad header: {e}")))?;
    if header.version != RECORD_VERSION {
        return Err(DecodeError(format!(
            "unsupported record version {}",
            header.version
        )));
    }
    Ok(CacheEntry {
        payload: bytes[payload_start..].to_vec(),
        stored_at_ms: header.stored_at_ms,
        expires_at_ms: header.expires_at_ms,
        metadata: header.metadata,
    })
}
