//! Cursor store abstraction
//!
//! The store maps a logical document name to the last version that was
//! synchronized into the corpus. Only the reconciliation step writes to it;
//! plugins get a [`CursorReader`].

use crate::error::CursorError;
use crate::version::Version;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One row of the version ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    /// Logical document name
    pub name: String,
    /// Last synchronized version
    pub version: Version,
    /// When the record was first written
    pub created_at: DateTime<Utc>,
    /// When the record was last overwritten
    pub updated_at: DateTime<Utc>,
}

/// Durable mapping `document name → last synchronized version`
///
/// Implementations must be safe to call concurrently for different names.
/// Writes for the same name are last-writer-wins.
#[async_trait]
pub trait VersionCursorStore: Send + Sync {
    /// Full record for a document, if one exists
    async fn record(&self, name: &str) -> Result<Option<CursorRecord>, CursorError>;

    /// Upsert the version for a document
    async fn set_last_version(&self, name: &str, version: &Version) -> Result<(), CursorError>;

    /// All records, ordered by name
    async fn records(&self) -> Result<Vec<CursorRecord>, CursorError>;

    /// Last synchronized version for a document
    async fn last_version(&self, name: &str) -> Result<Option<Version>, CursorError> {
        Ok(self.record(name).await?.map(|r| r.version))
    }

    /// True when no record exists or `candidate` is strictly newer
    async fn is_new_version_available(
        &self,
        name: &str,
        candidate: &Version,
    ) -> Result<bool, CursorError> {
        Ok(match self.last_version(name).await? {
            None => true,
            Some(stored) => *candidate > stored,
        })
    }
}

/// Read-only view of a cursor store handed to plugins
#[derive(Clone)]
pub struct CursorReader {
    inner: Arc<dyn VersionCursorStore>,
}

impl CursorReader {
    /// Wrap a store
    #[inline]
    #[must_use]
    pub fn new(inner: Arc<dyn VersionCursorStore>) -> Self {
        Self { inner }
    }

    /// See [`VersionCursorStore::last_version`]
    pub async fn last_version(&self, name: &str) -> Result<Option<Version>, CursorError> {
        self.inner.last_version(name).await
    }

    /// See [`VersionCursorStore::is_new_version_available`]
    pub async fn is_new_version_available(
        &self,
        name: &str,
        candidate: &Version,
    ) -> Result<bool, CursorError> {
        self.inner.is_new_version_available(name, candidate).await
    }
}

impl std::fmt::Debug for CursorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorReader").finish_non_exhaustive()
    }
}
