//! Process-local cursor store

use crate::error::CursorError;
use crate::store::{CursorRecord, VersionCursorStore};
use crate::version::Version;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory [`VersionCursorStore`]
///
/// Nothing survives the process. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    records: RwLock<BTreeMap<String, CursorRecord>>,
}

impl MemoryCursorStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked documents
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no document is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl VersionCursorStore for MemoryCursorStore {
    async fn record(&self, name: &str) -> Result<Option<CursorRecord>, CursorError> {
        Ok(self.records.read().get(name).cloned())
    }

    async fn set_last_version(&self, name: &str, version: &Version) -> Result<(), CursorError> {
        let now = Utc::now();
        let mut records = self.records.write();
        records
            .entry(name.to_string())
            .and_modify(|r| {
                r.version = *version;
                r.updated_at = now;
            })
            .or_insert_with(|| CursorRecord {
                name: name.to_string(),
                version: *version,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn records(&self) -> Result<Vec<CursorRecord>, CursorError> {
        Ok(self.records.read().values().cloned().collect())
    }
}
