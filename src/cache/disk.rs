// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistent tier: one file per entry under a dedicated directory.
//!
//! Filenames are the hex SHA-256 of the logical key, so keys of arbitrary
//! length and character set are safe filesystem identifiers and do not leak
//! content. Writes land in a `.tmp` sibling and are renamed into place, so a
//! reader never observes a half-written record. All mutation (write, delete,
//! wipe, cleanup, trim) is serialized behind a write lock; reads share a
//! read lock.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::entry::{decode_record, encode_record, now_ms, CacheEntry};

const ENTRY_EXT: &str = "entry";

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cache record encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable on-disk tier with single-writer, many-reader access.
pub struct DiskTier {
    dir: PathBuf,
    max_bytes: u64,
    lock: RwLock<()>,
}

fn file_name_for(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}.{ENTRY_EXT}", hex::encode(digest))
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == ENTRY_EXT)
}

impl DiskTier {
    /// Open (and create if needed) the storage directory.
    pub async fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, DiskError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            max_bytes,
            lock: RwLock::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }

    /// Read an entry. A corrupt record is deleted and reported as absent;
    /// only real I/O failures surface as errors.
    pub async fn read(&self, key: &str) -> Result<Option<CacheEntry>, DiskError> {
        let path = self.path_for(key);
        let bytes = {
            let _guard = self.lock.read().await;
            match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        match decode_record(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(key, error = %e, "deleting corrupt cache record");
                crate::metrics::record_eviction("disk", "corrupt");
                self.delete(key).await?;
                Ok(None)
            }
        }
    }

    /// Durably write an entry (atomic via temp file + rename).
    pub async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), DiskError> {
        let bytes = encode_record(key, entry)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        let _guard = self.lock.write().await;
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Delete an entry; idempotent.
    pub async fn delete(&self, key: &str) -> Result<(), DiskError> {
        let _guard = self.lock.write().await;
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry file in the storage area.
    pub async fn wipe(&self) -> Result<(), DiskError> {
        let _guard = self.lock.write().await;
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if is_entry_file(&path) {
                if let Err(e) = fs::remove_file(&path).await {
                    if e.kind() != io::ErrorKind::NotFound {
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete expired and unparseable records. Returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<usize, DiskError> {
        let now = now_ms();
        let _guard = self.lock.write().await;
        let mut removed = 0usize;

        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if !is_entry_file(&path) {
                continue;
            }
            let dead = match fs::read(&path).await {
                Ok(bytes) => match decode_record(&bytes) {
                    Ok(entry) => entry.is_expired(now),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "corrupt record found during cleanup");
                        crate::metrics::record_eviction("disk", "corrupt");
                        true
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if dead {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "cleanup pass removed dead records");
        }
        Ok(removed)
    }

    /// When total size exceeds the byte budget, delete entries oldest-stored
    /// first until back under. Access time never refreshes trim priority,
    /// only an explicit re-store does. Returns the number removed.
    pub async fn trim_to_capacity(&self) -> Result<usize, DiskError> {
        let _guard = self.lock.write().await;

        // (path, file size, stored_at_ms); unparseable records sort first
        let mut records: Vec<(PathBuf, u64, i64)> = Vec::new();
        let mut total: u64 = 0;

        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if !is_entry_file(&path) {
                continue;
            }
            let len = item.metadata().await?.len();
            let stored_at = match fs::read(&path).await {
                Ok(bytes) => decode_record(&bytes).map(|e| e.stored_at_ms).unwrap_or(i64::MIN),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            total += len;
            records.push((path, len, stored_at));
        }

        if total <= self.max_bytes {
            return Ok(0);
        }

        records.sort_by_key(|(_, _, stored_at)| *stored_at);
        let mut removed = 0usize;
        for (path, len, _) in records {
            if total <= self.max_bytes {
                break;
            }
            fs::remove_file(&path).await?;
            crate::metrics::record_eviction("disk", "trim");
            total = total.saturating_sub(len);
            removed += 1;
        }

        debug!(removed, total, budget = self.max_bytes, "trimmed disk tier to capacity");
        Ok(removed)
    }

    /// Total bytes currently held by entry files.
    pub async fn total_bytes(&self) -> Result<u64, DiskError> {
        let _guard = self.lock.read().await;
        let mut total = 0u64;
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            if is_entry_file(&item.path()) {
                total += item.metadata().await?.len();
            }
        }
        Ok(total)
    }
}
