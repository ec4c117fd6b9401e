//! Remote corpus client seam

use crate::error::CorpusError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Description attached to every upload
pub const UPLOAD_DESCRIPTION: &str = "Uploaded via docsync";

/// One document in the remote corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Store-assigned id
    pub id: String,
    /// Natural key
    pub display_name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CorpusEntry {
    /// Entry with no description
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: None,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether docsync uploaded this entry, judged by its description
    #[inline]
    #[must_use]
    pub fn is_own_upload(&self) -> bool {
        self.description.as_deref() == Some(UPLOAD_DESCRIPTION)
    }
}

/// Operations the reconciliation protocol needs from the remote store
///
/// Every call must classify its failures as transient or permanent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CorpusClient: Send + Sync {
    /// Full, uncached listing of the corpus
    async fn list_entries(&self) -> Result<Vec<CorpusEntry>, CorpusError>;

    /// Upload a file under a display name; returns the new entry id
    async fn upload_entry(&self, display_name: &str, path: &Path) -> Result<String, CorpusError>;

    /// Delete an entry by id
    async fn delete_entry(&self, id: &str) -> Result<(), CorpusError>;
}
