//! Plugin result contract
//!
//! A [`PluginResult`] is the only thing a connector hands back to the
//! scheduler. It names the logical document, carries at most one payload and
//! tells reconciliation whether the version cursor should move.

use crate::error::ConnectorError;
use docsync_cursor::{Version, VersionParseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metadata key carrying the source version marker
pub const VERSION_METADATA_KEY: &str = "source_version";

/// Metadata key selecting the file suffix for inline content
pub const EXTENSION_METADATA_KEY: &str = "extension";

/// Suffix used when no extension is given
pub const DEFAULT_EXTENSION: &str = "txt";

/// Outcome of one connector invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    /// Whether the connector succeeded
    pub success: bool,
    /// Logical document name, also the corpus display name
    pub display_name: String,
    /// Inline content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Locally materialized artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Free-form string metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Failure reason when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Whether a confirmed upload should advance the cursor
    #[serde(default = "default_true")]
    pub requires_version_update: bool,
    /// `file_path` is owned by the sync step and removed after reconciliation
    #[serde(default)]
    pub transient_artifact: bool,
}

fn default_true() -> bool {
    true
}

/// The effective payload of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// File on disk
    Artifact(&'a Path),
    /// Inline text
    Inline(&'a str),
    /// Nothing to upload
    Empty,
}

impl PluginResult {
    fn base(display_name: impl Into<String>) -> Self {
        Self {
            success: true,
            display_name: display_name.into(),
            content: None,
            file_path: None,
            metadata: BTreeMap::new(),
            error_message: None,
            requires_version_update: true,
            transient_artifact: false,
        }
    }

    /// Successful result with inline content
    #[must_use]
    pub fn from_content(display_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::base(display_name)
        }
    }

    /// Successful result pointing at a file the connector does not own
    #[must_use]
    pub fn from_file(display_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Self::base(display_name)
        }
    }

    /// Write `content` to a fresh temporary file and hand it over as a
    /// transient artifact
    ///
    /// The file survives until reconciliation removes it.
    ///
    /// # Errors
    /// Returns [`ConnectorError::Io`] if the file cannot be written.
    pub fn from_temp_file(
        display_name: impl Into<String>,
        content: &str,
        extension: &str,
    ) -> Result<Self, ConnectorError> {
        let suffix = format!(".{}", extension.trim_start_matches('.'));
        let mut file = tempfile::Builder::new()
            .prefix("docsync-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ConnectorError::io(std::env::temp_dir(), e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| ConnectorError::io(file.path(), e))?;
        let (_, path) = file
            .keep()
            .map_err(|e| ConnectorError::io(e.file.path().to_path_buf(), e.error))?;

        Ok(Self {
            file_path: Some(path),
            transient_artifact: true,
            ..Self::base(display_name)
        }
        .with_metadata(EXTENSION_METADATA_KEY, extension.trim_start_matches('.')))
    }

    /// Successful result without payload: nothing new to sync
    #[must_use]
    pub fn unchanged(display_name: impl Into<String>) -> Self {
        Self::base(display_name)
    }

    /// Failed result
    #[must_use]
    pub fn failure(display_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Self::base(display_name)
        }
    }

    /// Attach the source version marker
    #[must_use]
    pub fn with_version(self, version: Version) -> Self {
        self.with_metadata(VERSION_METADATA_KEY, version.to_rfc3339())
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Do not advance the cursor after upload
    #[inline]
    #[must_use]
    pub fn without_version_update(mut self) -> Self {
        self.requires_version_update = false;
        self
    }

    /// Effective payload; the artifact wins when both are set
    ///
    /// Blank inline content is not a payload.
    #[must_use]
    pub fn payload(&self) -> Payload<'_> {
        if let Some(path) = self.file_path.as_deref() {
            return Payload::Artifact(path);
        }
        match self.content.as_deref() {
            Some(text) if !text.is_empty() => Payload::Inline(text),
            _ => Payload::Empty,
        }
    }

    /// Whether there is anything to reconcile
    #[inline]
    #[must_use]
    pub fn has_payload(&self) -> bool {
        !matches!(self.payload(), Payload::Empty)
    }

    /// Parsed version marker, if present
    ///
    /// # Errors
    /// Returns the parse error when the marker is present but malformed.
    pub fn version(&self) -> Result<Option<Version>, VersionParseError> {
        self.metadata
            .get(VERSION_METADATA_KEY)
            .map(|raw| Version::parse(raw))
            .transpose()
    }

    /// File suffix to use when inline content must be materialized
    #[must_use]
    pub fn extension(&self) -> &str {
        self.metadata
            .get(EXTENSION_METADATA_KEY)
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_wins_over_inline() {
        let mut result = PluginResult::from_content("Tracker", "hello");
        result.file_path = Some(PathBuf::from("/tmp/tracker.txt"));
        assert_eq!(result.payload(), Payload::Artifact(Path::new("/tmp/tracker.txt")));
    }

    #[test]
    fn unchanged_has_no_payload() {
        let result = PluginResult::unchanged("Tracker");
        assert!(result.success);
        assert!(!result.has_payload());
        assert_eq!(PluginResult::from_content("Tracker", "").payload(), Payload::Empty);
    }

    #[test]
    fn version_roundtrips_through_metadata() {
        let v = Version::parse("2026-01-01T00:00:00Z").unwrap();
        let result = PluginResult::from_content("Tracker", "x").with_version(v);
        assert_eq!(result.metadata[VERSION_METADATA_KEY], "2026-01-01T00:00:00Z");
        assert_eq!(result.version().unwrap(), Some(v));
    }

    #[test]
    fn malformed_version_is_an_error() {
        let result = PluginResult::from_content("Tracker", "x").with_metadata(VERSION_METADATA_KEY, "yesterday");
        assert!(result.version().is_err());
    }

    #[test]
    fn extension_defaults_to_txt() {
        let result = PluginResult::from_content("Tracker", "x");
        assert_eq!(result.extension(), "txt");
        assert_eq!(result.with_metadata(EXTENSION_METADATA_KEY, ".md").extension(), "md");
    }

    #[test]
    fn temp_file_is_transient_artifact() {
        let result = PluginResult::from_temp_file("Tracker", "rows", "csv").unwrap();
        let path = result.file_path.clone().unwrap();
        assert!(result.transient_artifact);
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "rows");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn requires_version_update_defaults_true_when_deserialized() {
        let result: PluginResult =
            serde_json::from_str(r#"{"success":true,"display_name":"Tracker"}"#).unwrap();
        assert!(result.requires_version_update);
        assert!(!result.transient_artifact);
    }
}
