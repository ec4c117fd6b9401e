//! Error types for cursor stores

use crate::version::VersionParseError;

/// Errors raised by a [`VersionCursorStore`](crate::VersionCursorStore)
///
/// `StoreUnavailable` is distinct from an absent record: callers must never
/// treat it as "no prior version".
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// The backing store could not be reached
    #[error("cursor store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored version could not be parsed
    #[error("corrupt cursor record for '{name}': {source}")]
    CorruptRecord {
        /// Logical document name
        name: String,
        /// Parse failure
        #[source]
        source: VersionParseError,
    },

    /// Invalid store configuration
    #[error("invalid cursor store configuration: {0}")]
    InvalidConfig(String),

    /// Any other backend failure
    #[error("cursor store backend error: {0}")]
    Backend(String),
}

impl CursorError {
    /// Whether the failure is a connectivity problem
    #[inline]
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for CursorError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::StoreUnavailable(value.to_string()),
            // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("5" | "6" | "14")) =>
            {
                Self::StoreUnavailable(value.to_string())
            }
            _ => Self::Backend(value.to_string()),
        }
    }
}
