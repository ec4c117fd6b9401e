//! Built-in docsync connectors
//!
//! Registered under the implementation name [`BUILTIN`]:
//! - `local_file`: a document already on disk
//! - `inline_text`: content given directly in configuration
//! - `json_rows`: a JSON array of rows rendered into text records

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod inline_text;
pub mod json_rows;
pub mod local_file;

pub use inline_text::InlineText;
pub use json_rows::{JsonRows, RowRenderer};
pub use local_file::LocalFile;

use docsync_core::{ConnectorError, ConnectorRegistry, SourceConnector};
use docsync_cursor::Version;
use std::path::Path;
use std::sync::Arc;

/// Implementation name of the built-in connectors
pub const BUILTIN: &str = "builtin";

/// Register every built-in connector
pub fn register_builtin(registry: &mut ConnectorRegistry) {
    registry.register(BUILTIN, "local_file", |d| {
        Ok(Arc::new(LocalFile::from_descriptor(d)?) as Arc<dyn SourceConnector>)
    });
    registry.register(BUILTIN, "inline_text", |d| {
        Ok(Arc::new(InlineText::from_descriptor(d)?) as Arc<dyn SourceConnector>)
    });
    registry.register(BUILTIN, "json_rows", |d| {
        Ok(Arc::new(JsonRows::from_descriptor(d)?) as Arc<dyn SourceConnector>)
    });
}

/// Registry holding only the built-in connectors
#[must_use]
pub fn builtin_registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    register_builtin(&mut registry);
    registry
}

/// Source version of a file: its modification time
async fn modified_version(path: &Path) -> Result<Version, ConnectorError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ConnectorError::io(path, e))?;
    let modified = meta.modified().map_err(|e| ConnectorError::io(path, e))?;
    Ok(Version::from_system_time(modified))
}

fn file_display_name(path: &Path) -> Result<String, ConnectorError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ConnectorError::Config(format!("'{}' has no file name", path.display())))
}
