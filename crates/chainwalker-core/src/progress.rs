//! Progress store. Persists the walker's cursor for crash recovery.
//!
//! The record stores the last fully processed height plus the ids of the
//! transactions still owed for the next height. On restart the walker resumes
//! from this record instead of walking from scratch.
//!
//! Without a backing path the record lives only in process memory.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WalkerError;

/// File name used when no cache path is configured explicitly.
pub const DEFAULT_CACHE_FILE: &str = "chainwalker.cache.json";

/// The persisted cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Wall-clock time of the last write.
    pub last_updated: DateTime<Utc>,
    /// Highest height whose cycle completed without error.
    pub last_confirmed_height: u64,
    /// Message of the most recent failed cycle; empty when none.
    #[serde(default)]
    pub last_error: String,
    /// Transactions of height `last_confirmed_height + 1` not yet delivered.
    #[serde(default, with = "id_map")]
    pub pending_transaction_ids: BTreeSet<String>,
    /// Reserved.
    #[serde(default)]
    pub avg_processing_time: f64,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            last_updated: DateTime::<Utc>::default(),
            last_confirmed_height: 0,
            last_error: String::new(),
            pending_transaction_ids: BTreeSet::new(),
            avg_processing_time: 0.0,
        }
    }
}

/// Partial update merged into the record by [`ProgressStore::update`].
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub last_confirmed_height: Option<u64>,
    pub last_error: Option<String>,
    pub pending_transaction_ids: Option<BTreeSet<String>>,
}

/// Owns the cursor record and its optional backing file.
#[derive(Debug)]
pub struct ProgressStore {
    path: Option<PathBuf>,
    record: ProgressRecord,
}

impl ProgressStore {
    /// A store backed by `path`, or memory-only when `path` is `None` or empty.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.filter(|p| !p.as_os_str().is_empty()),
            record: ProgressRecord::default(),
        }
    }

    pub fn memory() -> Self {
        Self::new(None)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Some(path.into()))
    }

    pub fn is_memory_only(&self) -> bool {
        self.path.is_none()
    }

    /// The in-process record, as of the last `read`/`update`.
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn last_confirmed_height(&self) -> u64 {
        self.record.last_confirmed_height
    }

    pub fn last_error(&self) -> &str {
        &self.record.last_error
    }

    pub fn pending_transaction_ids(&self) -> &BTreeSet<String> {
        &self.record.pending_transaction_ids
    }

    /// Load the record.
    ///
    /// In memory-only mode the current record is returned as is. With a backing
    /// file the record is reloaded from disk; a missing file is initialised with
    /// defaults and written immediately.
    pub async fn read(&mut self) -> Result<&ProgressRecord, WalkerError> {
        let Some(path) = self.path.clone() else {
            return Ok(&self.record);
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                self.record = serde_json::from_slice(&bytes).map_err(|e| {
                    WalkerError::Storage(format!(
                        "invalid progress record in {}: {e}",
                        path.display()
                    ))
                })?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no progress record yet, initialising");
                self.reset(true).await?;
            }
            Err(e) => {
                return Err(WalkerError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        }
        Ok(&self.record)
    }

    /// Merge `update` into the record. Does not persist.
    pub fn update(&mut self, update: ProgressUpdate) {
        if let Some(height) = update.last_confirmed_height {
            self.record.last_confirmed_height = height;
        }
        if let Some(error) = update.last_error {
            self.record.last_error = error;
        }
        if let Some(ids) = update.pending_transaction_ids {
            self.record.pending_transaction_ids = ids;
        }
        self.touch();
    }

    /// Move the cursor to `height`.
    ///
    /// Pending ids belong to `last_confirmed_height + 1`, so they are dropped
    /// whenever the height actually changes.
    pub fn reposition(&mut self, height: u64) {
        let pending = (height != self.record.last_confirmed_height).then(BTreeSet::new);
        self.update(ProgressUpdate {
            last_confirmed_height: Some(height),
            pending_transaction_ids: pending,
            ..Default::default()
        });
    }

    /// Write the record to the backing file; no-op in memory-only mode.
    pub async fn persist(&mut self) -> Result<(), WalkerError> {
        self.touch();
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let json = to_tabbed_json(&self.record)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                WalkerError::Storage(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        // Write-then-rename so a crash never leaves a truncated record behind.
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            WalkerError::Storage(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            WalkerError::Storage(format!("failed to replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    /// Restore the default record, optionally persisting it.
    pub async fn reset(&mut self, should_persist: bool) -> Result<(), WalkerError> {
        self.record = ProgressRecord::default();
        if should_persist {
            self.persist().await?;
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.record.last_updated = Utc::now();
    }
}

fn to_tabbed_json(record: &ProgressRecord) -> Result<Vec<u8>, WalkerError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    record
        .serialize(&mut ser)
        .map_err(|e| WalkerError::Storage(format!("failed to encode progress record: {e}")))?;
    Ok(out)
}

/// Pending ids are stored as an `{ "<id>": 1 }` object.
mod id_map {
    use super::*;
    use serde::{Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(ids: &BTreeSet<String>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(ids.iter().map(|id| (id, 1u8)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
        let map = Option::<BTreeMap<String, serde_json::Value>>::deserialize(d)?;
        Ok(map.unwrap_or_default().into_keys().collect())
    }
}
