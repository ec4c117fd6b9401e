//! Execution plan
//!
//! Validates a descriptor set against a [`ConnectorRegistry`], builds the
//! dependency graph and fixes the execution order once:
//! - duplicate names, unknown dependencies and unresolvable connectors are
//!   [`ConfigurationError`]s
//! - cycles are [`SchedulerError::CyclicDependency`]
//! - ties in the topological order are broken by declaration order

use crate::connector::SourceConnector;
use crate::descriptor::{DependencyPolicy, PluginConfig, PluginDescriptor};
use crate::error::{ConfigurationError, SchedulerError};
use crate::registry::ConnectorRegistry;
use indexmap::IndexMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One validated plugin
#[derive(Clone)]
pub struct PlannedPlugin {
    descriptor: PluginDescriptor,
    config: Arc<PluginConfig>,
    connector: Option<Arc<dyn SourceConnector>>,
}

impl PlannedPlugin {
    /// Plugin name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Original descriptor
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Whether the plugin will run
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.connector.is_some()
    }

    pub(crate) fn config(&self) -> Arc<PluginConfig> {
        self.config.clone()
    }

    pub(crate) fn connector(&self) -> Option<Arc<dyn SourceConnector>> {
        self.connector.clone()
    }

    pub(crate) fn policy(&self, default: DependencyPolicy) -> DependencyPolicy {
        self.descriptor.dependency_policy.unwrap_or(default)
    }
}

impl std::fmt::Debug for PlannedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedPlugin")
            .field("name", &self.descriptor.name)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Immutable, validated plugin set with a fixed execution order
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    plugins: Vec<PlannedPlugin>,
    index: IndexMap<String, usize>,
    graph: DiGraph<usize, ()>,
    order: Vec<usize>,
}

impl ExecutionPlan {
    /// Validate descriptors and instantiate enabled connectors
    ///
    /// # Errors
    /// - [`SchedulerError::Configuration`] for invalid descriptors
    /// - [`SchedulerError::CyclicDependency`] when the graph is not a DAG
    pub fn load(
        descriptors: Vec<PluginDescriptor>,
        registry: &ConnectorRegistry,
    ) -> Result<Self, SchedulerError> {
        let mut index = IndexMap::with_capacity(descriptors.len());
        for (pos, d) in descriptors.iter().enumerate() {
            if d.name.trim().is_empty() {
                return Err(ConfigurationError::EmptyName(pos).into());
            }
            if index.insert(d.name.clone(), pos).is_some() {
                return Err(ConfigurationError::DuplicatePlugin(d.name.clone()).into());
            }
        }

        let mut factories = Vec::with_capacity(descriptors.len());
        for d in &descriptors {
            factories.push(registry.resolve(d)?);
        }

        // Node i is descriptor i; edges point from dependency to dependent.
        let mut graph = DiGraph::<usize, ()>::with_capacity(descriptors.len(), 0);
        for pos in 0..descriptors.len() {
            graph.add_node(pos);
        }
        for (pos, d) in descriptors.iter().enumerate() {
            for dep in &d.depends_on {
                let &from = index.get(dep).ok_or_else(|| ConfigurationError::UnknownDependency {
                    plugin: d.name.clone(),
                    dependency: dep.clone(),
                })?;
                graph.update_edge(NodeIndex::new(from), NodeIndex::new(pos), ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(SchedulerError::CyclicDependency {
                cycle: cycle_members(&graph, cycle.node_id(), &descriptors),
            });
        }

        let order = stable_order(&graph);

        let mut plugins = Vec::with_capacity(descriptors.len());
        for (d, factory) in descriptors.into_iter().zip(factories) {
            let connector = if d.enabled {
                let built = factory(&d).map_err(|e| ConfigurationError::InvalidPluginConfig {
                    plugin: d.name.clone(),
                    message: e.to_string(),
                })?;
                Some(built)
            } else {
                None
            };
            plugins.push(PlannedPlugin {
                config: Arc::new(d.config.clone()),
                descriptor: d,
                connector,
            });
        }

        tracing::debug!(
            plugins = plugins.len(),
            edges = graph.edge_count(),
            "execution plan built"
        );

        Ok(Self {
            plugins,
            index,
            graph,
            order,
        })
    }

    /// Plugin names in execution order
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.plugins[i].name()).collect()
    }

    /// Plugin by name
    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&PlannedPlugin> {
        self.index.get(name).map(|&i| &self.plugins[i])
    }

    /// Plugins in declaration order
    #[inline]
    #[must_use]
    pub fn plugins(&self) -> &[PlannedPlugin] {
        &self.plugins
    }

    /// Number of plugins, enabled or not
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if the plan is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub(crate) fn execution_order(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn at(&self, pos: usize) -> &PlannedPlugin {
        &self.plugins[pos]
    }

    pub(crate) fn dependencies(&self, pos: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors(pos, Direction::Incoming)
    }

    pub(crate) fn dependents(&self, pos: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors(pos, Direction::Outgoing)
    }

    pub(crate) fn in_degree(&self, pos: usize) -> usize {
        self.dependencies(pos).count()
    }

    fn neighbors(&self, pos: usize, dir: Direction) -> impl Iterator<Item = usize> + '_ {
        self.graph
            .neighbors_directed(NodeIndex::new(pos), dir)
            .map(|n| self.graph[n])
    }
}

/// Kahn's algorithm, always taking the lowest declaration index that is ready
fn stable_order(graph: &DiGraph<usize, ()>) -> Vec<usize> {
    let mut remaining: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for dependent in graph.neighbors_directed(NodeIndex::new(next), Direction::Outgoing) {
            let slot = &mut remaining[dependent.index()];
            *slot -= 1;
            if *slot == 0 {
                ready.insert(dependent.index());
            }
        }
    }
    order
}

fn cycle_members(
    graph: &DiGraph<usize, ()>,
    seed: NodeIndex,
    descriptors: &[PluginDescriptor],
) -> Vec<String> {
    let mut members: Vec<usize> = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.contains(&seed))
        .unwrap_or_else(|| vec![seed])
        .into_iter()
        .map(|n| graph[n])
        .collect();
    members.sort_unstable();
    members
        .into_iter()
        .map(|i| descriptors[i].name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::PluginContext;
    use crate::error::ConnectorError;
    use crate::result::PluginResult;
    use async_trait::async_trait;

    struct Nothing;

    #[async_trait]
    impl SourceConnector for Nothing {
        async fn produce_result(&self, ctx: &PluginContext) -> Result<PluginResult, ConnectorError> {
            Ok(PluginResult::unchanged(ctx.plugin()))
        }
    }

    fn registry() -> ConnectorRegistry {
        let mut r = ConnectorRegistry::new();
        r.register_instance("t", "nothing", Arc::new(Nothing));
        r.register("t", "picky", |d| {
            if d.config.contains_key("path") {
                Ok(Arc::new(Nothing) as Arc<dyn SourceConnector>)
            } else {
                Err(ConnectorError::Config("path is required".into()))
            }
        });
        r
    }

    fn p(name: &str, deps: &[&str]) -> PluginDescriptor {
        PluginDescriptor::new(name, "t", "nothing").with_dependencies(deps.iter().copied())
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let plan = ExecutionPlan::load(vec![p("c", &[]), p("a", &[]), p("b", &[])], &registry()).unwrap();
        assert_eq!(plan.order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn dependencies_come_first() {
        let plan = ExecutionPlan::load(
            vec![p("c", &["a", "b"]), p("b", &["a"]), p("a", &[]), p("d", &[])],
            &registry(),
        )
        .unwrap();
        assert_eq!(plan.order(), vec!["a", "b", "c", "d"]);
        assert_eq!(plan.order(), plan.order());
    }

    #[test]
    fn duplicate_name_rejected() {
        let err = ExecutionPlan::load(vec![p("a", &[]), p("a", &[])], &registry()).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Configuration(ConfigurationError::DuplicatePlugin(ref n)) if n == "a"
        ));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let err = ExecutionPlan::load(vec![p("a", &["ghost"])], &registry()).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Configuration(ConfigurationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn cycle_reports_members_only() {
        let err = ExecutionPlan::load(
            vec![p("x", &[]), p("a", &["c"]), p("b", &["a"]), p("c", &["b"]), p("y", &["x"])],
            &registry(),
        )
        .unwrap_err();
        assert_eq!(err.cycle(), Some(&["a".to_string(), "b".into(), "c".into()][..]));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = ExecutionPlan::load(vec![p("a", &["a"])], &registry()).unwrap_err();
        assert_eq!(err.cycle(), Some(&["a".to_string()][..]));
    }

    #[test]
    fn factory_rejection_is_configuration_error() {
        let err = ExecutionPlan::load(vec![PluginDescriptor::new("a", "t", "picky")], &registry())
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Configuration(ConfigurationError::InvalidPluginConfig { .. })
        ));
    }

    #[test]
    fn disabled_plugins_are_validated_not_instantiated() {
        let plan = ExecutionPlan::load(
            vec![PluginDescriptor::new("a", "t", "picky").disabled()],
            &registry(),
        )
        .unwrap();
        assert!(!plan.plugin("a").unwrap().is_enabled());

        let err = ExecutionPlan::load(
            vec![PluginDescriptor::new("a", "t", "missing").disabled()],
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Configuration(ConfigurationError::UnknownConnector { .. })
        ));
    }
}
