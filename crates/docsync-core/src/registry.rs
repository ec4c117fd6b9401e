//! Connector registry
//!
//! Maps `(implementation, connector)` to a factory. Plans resolve every
//! descriptor against the registry at load time, so a typo in configuration
//! fails before any plugin runs.

use crate::connector::SourceConnector;
use crate::descriptor::PluginDescriptor;
use crate::error::{ConfigurationError, ConnectorError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a connector from its descriptor
pub type ConnectorFactory =
    Arc<dyn Fn(&PluginDescriptor) -> Result<Arc<dyn SourceConnector>, ConnectorError> + Send + Sync>;

/// Registry of known connectors, grouped by implementation
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    implementations: BTreeMap<String, BTreeMap<String, ConnectorFactory>>,
}

impl ConnectorRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector factory, replacing any previous one
    pub fn register<F>(&mut self, implementation: &str, connector: &str, factory: F)
    where
        F: Fn(&PluginDescriptor) -> Result<Arc<dyn SourceConnector>, ConnectorError>
            + Send
            + Sync
            + 'static,
    {
        self.implementations
            .entry(implementation.to_string())
            .or_default()
            .insert(connector.to_string(), Arc::new(factory));
    }

    /// Register a connector that needs no configuration
    pub fn register_instance(
        &mut self,
        implementation: &str,
        connector: &str,
        instance: Arc<dyn SourceConnector>,
    ) {
        self.register(implementation, connector, move |_| Ok(instance.clone()));
    }

    /// Check if a connector exists
    #[inline]
    #[must_use]
    pub fn contains(&self, implementation: &str, connector: &str) -> bool {
        self.implementations
            .get(implementation)
            .is_some_and(|m| m.contains_key(connector))
    }

    /// Registered implementation names
    #[must_use]
    pub fn implementations(&self) -> Vec<&str> {
        self.implementations.keys().map(String::as_str).collect()
    }

    /// Connector names within an implementation
    #[must_use]
    pub fn connectors(&self, implementation: &str) -> Vec<&str> {
        self.implementations
            .get(implementation)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Total number of connectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.implementations.values().map(BTreeMap::len).sum()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the factory for a descriptor
    ///
    /// # Errors
    /// [`ConfigurationError::UnknownImplementation`] or
    /// [`ConfigurationError::UnknownConnector`].
    pub fn resolve(&self, descriptor: &PluginDescriptor) -> Result<&ConnectorFactory, ConfigurationError> {
        let module = self.implementations.get(&descriptor.implementation).ok_or_else(|| {
            ConfigurationError::UnknownImplementation {
                plugin: descriptor.name.clone(),
                implementation: descriptor.implementation.clone(),
            }
        })?;
        module
            .get(&descriptor.connector)
            .ok_or_else(|| ConfigurationError::UnknownConnector {
                plugin: descriptor.name.clone(),
                implementation: descriptor.implementation.clone(),
                connector: descriptor.connector.clone(),
            })
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: BTreeMap<&str, Vec<&str>> = self
            .implementations
            .iter()
            .map(|(k, v)| (k.as_str(), v.keys().map(String::as_str).collect()))
            .collect();
        f.debug_struct("ConnectorRegistry")
            .field("implementations", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::PluginContext;
    use crate::result::PluginResult;
    use async_trait::async_trait;

    struct Nothing;

    #[async_trait]
    impl SourceConnector for Nothing {
        async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
            Ok(PluginResult::unchanged(ctx.plugin()))
        }
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut registry = ConnectorRegistry::new();
        assert!(registry.is_empty());
        registry.register_instance("builtin", "nothing", Arc::new(Nothing));

        assert!(registry.contains("builtin", "nothing"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.implementations(), vec!["builtin"]);
        assert_eq!(registry.connectors("builtin"), vec!["nothing"]);

        let d = PluginDescriptor::new("a", "builtin", "nothing");
        assert!(registry.resolve(&d).is_ok());
    }

    #[test]
    fn registry_unknown_implementation_and_connector() {
        let mut registry = ConnectorRegistry::new();
        registry.register_instance("builtin", "nothing", Arc::new(Nothing));

        let missing_module = PluginDescriptor::new("a", "sheets", "nothing");
        assert!(matches!(
            registry.resolve(&missing_module),
            Err(ConfigurationError::UnknownImplementation { .. })
        ));

        let missing_class = PluginDescriptor::new("a", "builtin", "other");
        assert!(matches!(
            registry.resolve(&missing_class),
            Err(ConfigurationError::UnknownConnector { .. })
        ));
    }
}
