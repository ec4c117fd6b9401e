//! Document already materialized on disk

use crate::{file_display_name, modified_version};
use async_trait::async_trait;
use docsync_core::{ConnectorError, PluginContext, PluginDescriptor, PluginResult, SourceConnector};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    path: PathBuf,
    #[serde(default)]
    display_name: Option<String>,
}

/// Uploads a file whenever its modification time moves past the cursor
///
/// The file stays owned by its producer and is never removed.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    display_name: String,
}

impl LocalFile {
    /// Connector for a path, named after the file unless told otherwise
    ///
    /// # Errors
    /// [`ConnectorError::Config`] when no display name can be derived.
    pub fn new(path: impl Into<PathBuf>, display_name: Option<String>) -> Result<Self, ConnectorError> {
        let path = path.into();
        let display_name = match display_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => file_display_name(&path)?,
        };
        Ok(Self { path, display_name })
    }

    /// Build from `config.path` and optional `config.display_name`
    ///
    /// # Errors
    /// [`ConnectorError::Config`] for missing or unknown keys.
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, ConnectorError> {
        let config: Config = descriptor.config_as()?;
        Self::new(config.path, config.display_name)
    }

    /// Display name used in the corpus
    #[inline]
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

#[async_trait]
impl SourceConnector for LocalFile {
    async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
        let version = modified_version(&self.path).await?;
        if !ctx.cursor().is_new_version_available(&self.display_name, &version).await? {
            tracing::debug!(display_name = %self.display_name, %version, "file unchanged");
            return Ok(PluginResult::unchanged(&self.display_name));
        }
        Ok(PluginResult::from_file(&self.display_name, &self.path).with_version(version))
    }
}
