//! Content given directly in configuration

use async_trait::async_trait;
use docsync_core::{
    ConnectorError, PluginContext, PluginDescriptor, PluginResult, SourceConnector, EXTENSION_METADATA_KEY,
};
use docsync_cursor::Version;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    display_name: String,
    content: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    extension: Option<String>,
}

/// Publishes fixed text
///
/// With a `version` the text is uploaded once per version. Without one it is
/// uploaded on every run and the cursor is left alone.
#[derive(Debug, Clone)]
pub struct InlineText {
    display_name: String,
    content: String,
    version: Option<Version>,
    extension: Option<String>,
}

impl InlineText {
    /// Connector for a piece of text
    #[must_use]
    pub fn new(display_name: impl Into<String>, content: impl Into<String>, version: Option<Version>) -> Self {
        Self {
            display_name: display_name.into(),
            content: content.into(),
            version,
            extension: None,
        }
    }

    /// Build from configuration
    ///
    /// # Errors
    /// [`ConnectorError::Config`] for missing keys or an unparsable version.
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, ConnectorError> {
        let config: Config = descriptor.config_as()?;
        let version = config
            .version
            .as_deref()
            .map(Version::parse)
            .transpose()
            .map_err(|e| ConnectorError::Config(format!("{}: {e}", descriptor.name)))?;
        Ok(Self {
            extension: config.extension,
            ..Self::new(config.display_name, config.content, version)
        })
    }
}

#[async_trait]
impl SourceConnector for InlineText {
    async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
        let mut result = PluginResult::from_content(&self.display_name, self.content.as_str());
        if let Some(ext) = &self.extension {
            result = result.with_metadata(EXTENSION_METADATA_KEY, ext.as_str());
        }

        match self.version {
            Some(version) => {
                if ctx.cursor().is_new_version_available(&self.display_name, &version).await? {
                    Ok(result.with_version(version))
                } else {
                    Ok(PluginResult::unchanged(&self.display_name))
                }
            }
            None => Ok(result.without_version_update()),
        }
    }
}
