//! docsync Version Cursors
//!
//! Durable, crash-consistent tracking of the last synchronized source version
//! per logical document:
//! - [`Version`]: ordered revision marker (UTC timestamp)
//! - [`VersionCursorStore`]: the ledger abstraction
//! - [`CursorReader`]: the read-only view plugins receive
//! - [`MemoryCursorStore`] and [`SqliteCursorStore`]: backends
//!
//! # Example
//!
//! ```rust,ignore
//! use docsync_cursor::{SqliteCursorStore, Version, VersionCursorStore};
//!
//! let store = SqliteCursorStore::connect("sqlite://docsync.db", "file_tracker").await?;
//! let candidate = Version::parse("2026-01-01T00:00:00Z")?;
//! if store.is_new_version_available("Tracker", &candidate).await? {
//!     // ... upload, then:
//!     store.set_last_version("Tracker", &candidate).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod version;

pub use error::CursorError;
pub use memory::MemoryCursorStore;
pub use sqlite::{SqliteCursorStore, DEFAULT_TABLE};
pub use store::{CursorReader, CursorRecord, VersionCursorStore};
pub use version::{Version, VersionParseError};
