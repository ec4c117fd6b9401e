//! Error types for corpus reconciliation

use docsync_cursor::{CursorError, VersionParseError};
use std::fmt;
use std::path::PathBuf;

/// Failure of a single corpus call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorpusError {
    /// Worth retrying: network, timeout, rate limit, server error
    #[error("transient corpus failure: {0}")]
    Transient(String),

    /// Retrying will not help: bad request, auth, not found
    #[error("permanent corpus failure: {0}")]
    Permanent(String),
}

impl CorpusError {
    /// Whether the retry policy should try again
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Per-document reconciliation failure
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Result was not successful; nothing was touched
    #[error("'{display_name}' was not produced successfully: {reason}")]
    NotSuccessful {
        /// Document display name
        display_name: String,
        /// Connector-supplied reason
        reason: String,
    },

    /// Successful result without anything to upload
    #[error("'{0}' has no content or artifact to upload")]
    EmptyPayload(String),

    /// Version marker present but malformed
    #[error("'{display_name}' carries an invalid version marker: {source}")]
    InvalidVersion {
        /// Document display name
        display_name: String,
        /// Parse failure
        #[source]
        source: VersionParseError,
    },

    /// Local artifact could not be read or staged
    #[error("artifact {} for '{display_name}': {source}", .path.display())]
    Artifact {
        /// Document display name
        display_name: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Listing the corpus failed; nothing was uploaded
    #[error("listing corpus for '{display_name}' failed: {source}")]
    Listing {
        /// Document display name
        display_name: String,
        /// Final corpus error
        #[source]
        source: CorpusError,
    },

    /// Upload failed; the previous entry is untouched
    #[error("upload of '{display_name}' failed: {source}")]
    Upload {
        /// Document display name
        display_name: String,
        /// Final corpus error
        #[source]
        source: CorpusError,
    },

    /// New content is live but the cursor could not be advanced
    #[error("'{display_name}' uploaded as {entry_id} but cursor update failed: {source}")]
    Cursor {
        /// Document display name
        display_name: String,
        /// Entry that is now live
        entry_id: String,
        /// Cursor store failure
        #[source]
        source: CursorError,
    },
}

/// More than one corpus entry shares a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusConsistencyWarning {
    /// Display name
    pub display_name: String,
    /// Matching entry ids in listing order; the first is canonical
    pub entry_ids: Vec<String>,
}

impl fmt::Display for CorpusConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} corpus entries named '{}' ({})",
            self.entry_ids.len(),
            self.display_name,
            self.entry_ids.join(", ")
        )
    }
}

/// Non-fatal issue found while reconciling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileWarning {
    /// Duplicate entries before the upload
    Consistency(CorpusConsistencyWarning),
    /// Stale entry could not be deleted and remains as a duplicate
    StaleDeleteFailed {
        /// Entry left behind
        entry_id: String,
        /// Final corpus error
        reason: String,
    },
    /// Cursor update requested but the result has no version marker
    MissingVersion,
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consistency(w) => w.fmt(f),
            Self::StaleDeleteFailed { entry_id, reason } => {
                write!(f, "stale entry {entry_id} not deleted: {reason}")
            }
            Self::MissingVersion => f.write_str("no version marker; cursor not advanced"),
        }
    }
}
