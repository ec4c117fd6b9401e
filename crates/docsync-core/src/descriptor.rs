//! Plugin descriptors
//!
//! Descriptors are loaded once from configuration and never change during a run.

use crate::error::ConnectorError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Free-form plugin configuration
pub type PluginConfig = serde_json::Map<String, serde_json::Value>;

/// How a plugin reacts to the outcome of its dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Run once every dependency has finished, whatever the outcome
    #[default]
    RunAfterCompletion,
    /// Run only if every dependency succeeded; otherwise report `Blocked`
    RequireSuccess,
}

/// Declaration of one ingestion unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginDescriptor {
    /// Unique plugin name
    pub name: String,
    /// Connector module the plugin is implemented in
    pub implementation: String,
    /// Connector within the module
    pub connector: String,
    /// Disabled plugins are validated but never run
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Plugins that must finish first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Connector-specific configuration
    #[serde(default)]
    pub config: PluginConfig,
    /// Overrides the run-level policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_policy: Option<DependencyPolicy>,
}

fn default_enabled() -> bool {
    true
}

impl PluginDescriptor {
    /// Enabled descriptor with no dependencies and empty config
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        implementation: impl Into<String>,
        connector: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            connector: connector.into(),
            enabled: true,
            depends_on: Vec::new(),
            config: PluginConfig::new(),
            dependency_policy: None,
        }
    }

    /// Add dependencies
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Set one config entry
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Override the dependency policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: DependencyPolicy) -> Self {
        self.dependency_policy = Some(policy);
        self
    }

    /// Mark as disabled
    #[inline]
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Deserialize the config map into a typed connector config
    ///
    /// # Errors
    /// Returns [`ConnectorError::Config`] naming the plugin on mismatch.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, ConnectorError> {
        serde_json::from_value(serde_json::Value::Object(self.config.clone()))
            .map_err(|e| ConnectorError::Config(format!("{}: {e}", self.name)))
    }
}
