//! Error types for docsync core
//!
//! - [`SchedulerError`]: fatal at load time, nothing has run yet
//! - [`ConfigurationError`]: a descriptor set that cannot be scheduled
//! - [`ConnectorError`]: one plugin failed to produce its result

use docsync_cursor::CursorError;
use std::path::PathBuf;

/// Boxed error used at the result-handler seam
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while loading a plugin set
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Descriptor set is invalid
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Dependency graph contains a cycle
    #[error("cyclic dependency between plugins: {}", .cycle.join(", "))]
    CyclicDependency {
        /// Plugins on the cycle, in declaration order
        cycle: Vec<String>,
    },
}

impl SchedulerError {
    /// Plugins on the offending cycle, if this is a cycle error
    #[inline]
    #[must_use]
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::CyclicDependency { cycle } => Some(cycle),
            Self::Configuration(_) => None,
        }
    }
}

/// A descriptor set that cannot be turned into an execution plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// Two descriptors share a name
    #[error("duplicate plugin name '{0}'")]
    DuplicatePlugin(String),

    /// Descriptor with an empty name
    #[error("plugin at position {0} has an empty name")]
    EmptyName(usize),

    /// No connector module registered under this implementation reference
    #[error("plugin '{plugin}': unknown implementation '{implementation}'")]
    UnknownImplementation {
        /// Plugin name
        plugin: String,
        /// Implementation reference
        implementation: String,
    },

    /// Implementation exists but has no such connector
    #[error("plugin '{plugin}': implementation '{implementation}' has no connector '{connector}'")]
    UnknownConnector {
        /// Plugin name
        plugin: String,
        /// Implementation reference
        implementation: String,
        /// Connector name
        connector: String,
    },

    /// Dependency on a plugin that is not declared
    #[error("plugin '{plugin}' depends on unknown plugin '{dependency}'")]
    UnknownDependency {
        /// Plugin name
        plugin: String,
        /// Missing dependency
        dependency: String,
    },

    /// Connector factory rejected the plugin's config
    #[error("plugin '{plugin}': invalid config: {message}")]
    InvalidPluginConfig {
        /// Plugin name
        plugin: String,
        /// Factory message
        message: String,
    },
}

/// Failure of a single source connector invocation
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Config could not be interpreted
    #[error("invalid connector config: {0}")]
    Config(String),

    /// Cursor lookup failed
    #[error("cursor store: {0}")]
    Cursor(#[from] CursorError),

    /// Local filesystem failure
    #[error("io error on {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Source-specific failure
    #[error("source error: {0}")]
    Source(String),

    /// Run was cancelled while the connector was working
    #[error("cancelled")]
    Cancelled,
}

impl ConnectorError {
    /// Wrap an io error with the path it concerns
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_members() {
        let err = SchedulerError::CyclicDependency {
            cycle: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency between plugins: a, b");
        assert_eq!(err.cycle(), Some(&["a".to_string(), "b".to_string()][..]));
    }

    #[test]
    fn configuration_wraps_transparently() {
        let err: SchedulerError = ConfigurationError::DuplicatePlugin("x".into()).into();
        assert!(err.cycle().is_none());
        assert!(err.to_string().contains("duplicate plugin name 'x'"));
    }
}
