//! Dependency-first ordering of service definitions.
//!
//! The graph holds one node per service that declares dependencies and one
//! per dependency target. Ordering repeatedly removes nodes that nothing
//! remaining depends on, prepending each to the sequence, so every service
//! ends up after everything it depends on.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

use log::debug;

use crate::error::{Error, Result, ValidationCode, ValidationError};
use crate::service::catalog::{ServiceCatalog, SERVICES_KEY, SERVICE_SEQUENCE_KEY};
use crate::service::definition::ServiceDefinition;

/// One service in a [`DependencyGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    id: String,
    depends_on: BTreeSet<String>,
    depended_by: BTreeSet<String>,
}

impl DependencyNode {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            depends_on: BTreeSet::new(),
            depended_by: BTreeSet::new(),
        }
    }

    /// The service identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Services this one depends on.
    #[must_use]
    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    /// Services that depend on this one.
    #[must_use]
    pub fn depended_by(&self) -> &BTreeSet<String> {
        &self.depended_by
    }
}

/// Transient dependency graph for one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, DependencyNode>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node for `id` if there is none.
    pub fn add_service(&mut self, id: &str) {
        if !self.nodes.contains_key(id) {
            self.nodes.insert(id.to_string(), DependencyNode::new(id));
        }
    }

    /// Records that `dependent` depends on `dependency`, adding both nodes.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        self.add_service(dependent);
        self.add_service(dependency);
        if let Some(node) = self.nodes.get_mut(dependent) {
            node.depends_on.insert(dependency.to_string());
        }
        if let Some(node) = self.nodes.get_mut(dependency) {
            node.depended_by.insert(dependent.to_string());
        }
    }

    /// The node for `id`.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&DependencyNode> {
        self.nodes.get(id)
    }

    /// Node identifiers, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Services left over when ordering stops making progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCycle {
    /// Every identifier that could not be ordered, sorted.
    pub remaining: Vec<String>,
    /// One concrete cycle among them, starting and ending on the same
    /// identifier.
    pub path: Vec<String>,
}

impl fmt::Display for DependencyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unresolved dependency cycle among [{}]",
            self.remaining.join(", ")
        )?;
        if !self.path.is_empty() {
            write!(f, " ({})", self.path.join(" -> "))?;
        }
        Ok(())
    }
}

/// Computes the initialization order of a service catalog.
///
/// # Examples
///
/// ```
/// use svcboot::service::{DependencyGraphResolver, ServiceCatalog, ServiceDefinition};
///
/// let catalog = ServiceCatalog::from_definitions([
///     ServiceDefinition::new("api").with_dependencies(["cache", "db"]),
///     ServiceDefinition::new("cache").with_dependencies(["db"]),
///     ServiceDefinition::new("db"),
/// ]);
///
/// let order = DependencyGraphResolver::resolve(&catalog).unwrap();
/// assert_eq!(order, ["db", "cache", "api"]);
/// ```
pub struct DependencyGraphResolver;

impl DependencyGraphResolver {
    /// Builds the graph for `definitions`.
    ///
    /// Dependencies on identifiers missing from `definitions` still get
    /// their edge, and each one is reported as a validation error.
    #[must_use]
    pub fn build_graph(
        definitions: &BTreeMap<String, ServiceDefinition>,
    ) -> (DependencyGraph, Vec<ValidationError>) {
        let mut graph = DependencyGraph::new();
        let mut errors = Vec::new();

        for (id, definition) in definitions {
            if definition.dependencies().is_empty() {
                continue;
            }
            graph.add_service(id);
            for dependency in definition.dependencies() {
                graph.add_dependency(id, dependency);
                if !definitions.contains_key(dependency) {
                    errors.push(ValidationError::new(
                        format!("{SERVICES_KEY}.{id}.dependencies"),
                        ValidationCode::ValueNotAllowed,
                        format!("service '{id}' depends on unknown service '{dependency}'"),
                    ));
                }
            }
        }

        (graph, errors)
    }

    /// Orders the graph so dependencies come before their dependents.
    ///
    /// Each pass takes every node that nothing remaining depends on, in
    /// identifier order, and prepends it to the sequence.
    ///
    /// # Errors
    ///
    /// Returns the nodes that could not be ordered if a pass finds no such
    /// node while the graph is not yet empty.
    pub fn dependency_order(
        graph: &DependencyGraph,
    ) -> std::result::Result<Vec<String>, DependencyCycle> {
        let mut working = graph.nodes.clone();
        let mut sequence = VecDeque::with_capacity(working.len());

        loop {
            let roots: Vec<String> = working
                .values()
                .filter(|node| node.depended_by.is_empty())
                .map(|node| node.id.clone())
                .collect();
            if roots.is_empty() {
                break;
            }

            for root in roots {
                let Some(node) = working.remove(&root) else {
                    continue;
                };
                for dependency in &node.depends_on {
                    if let Some(target) = working.get_mut(dependency) {
                        target.depended_by.remove(&root);
                    }
                }
                sequence.push_front(root);
            }
        }

        if working.is_empty() {
            Ok(sequence.into())
        } else {
            Err(DependencyCycle {
                remaining: working.keys().cloned().collect(),
                path: find_cycle(&working),
            })
        }
    }

    /// Places the known identifiers of `sequence` first, then `order`,
    /// then any of `catalog_ids` not yet placed. Each identifier appears
    /// once, at its first placement.
    #[must_use]
    pub fn apply_sequence<'a>(
        order: Vec<String>,
        sequence: &[String],
        catalog_ids: impl IntoIterator<Item = &'a str> + Clone,
    ) -> Vec<String> {
        let known: HashSet<&str> = catalog_ids.clone().into_iter().collect();
        let mut placed = HashSet::new();
        let mut result = Vec::with_capacity(known.len());

        for id in sequence {
            if !known.contains(id.as_str()) {
                debug!("'{SERVICE_SEQUENCE_KEY}' names unknown service '{id}'");
                continue;
            }
            if placed.insert(id.clone()) {
                result.push(id.clone());
            }
        }
        for id in order {
            if placed.insert(id.clone()) {
                result.push(id);
            }
        }
        for id in catalog_ids {
            if placed.insert(id.to_string()) {
                result.push(id.to_string());
            }
        }

        result
    }

    /// Computes the full initialization order of `catalog`.
    ///
    /// # Errors
    ///
    /// Returns one [`Error::Validation`] holding every catalog problem,
    /// every unknown dependency and any dependency cycle.
    pub fn resolve(catalog: &ServiceCatalog) -> Result<Vec<String>> {
        let mut errors = catalog.errors().to_vec();

        let (graph, graph_errors) = Self::build_graph(catalog.definitions());
        errors.extend(graph_errors);

        let order = match Self::dependency_order(&graph) {
            Ok(order) => order,
            Err(cycle) => {
                errors.push(ValidationError::new(
                    SERVICES_KEY,
                    ValidationCode::Failed,
                    cycle.to_string(),
                ));
                Vec::new()
            }
        };

        if !errors.is_empty() {
            return Err(Error::Validation {
                message: format!("service catalog has {} problem(s)", errors.len()),
                errors,
            });
        }

        Ok(Self::apply_sequence(
            order,
            catalog.sequence(),
            catalog.definitions().keys().map(String::as_str),
        ))
    }
}

/// Finds one cycle among `nodes` by depth-first search over `depends_on`.
fn find_cycle(nodes: &BTreeMap<String, DependencyNode>) -> Vec<String> {
    fn visit<'a>(
        id: &'a str,
        nodes: &'a BTreeMap<String, DependencyNode>,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(start) = stack.iter().position(|on_stack| *on_stack == id) {
            let mut cycle: Vec<String> = stack[start..].iter().map(ToString::to_string).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if done.contains(id) {
            return None;
        }
        stack.push(id);
        if let Some(node) = nodes.get(id) {
            for next in &node.depends_on {
                if let Some(cycle) = visit(next, nodes, stack, done) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        done.insert(id);
        None
    }

    let mut done = HashSet::new();
    for id in nodes.keys() {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(id, nodes, &mut stack, &mut done) {
            return cycle;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions(edges: &[(&str, &[&str])]) -> BTreeMap<String, ServiceDefinition> {
        edges
            .iter()
            .map(|(id, deps)| {
                (
                    (*id).to_string(),
                    ServiceDefinition::new(*id).with_dependencies(deps.iter().copied()),
                )
            })
            .collect()
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_graph_only_holds_connected_services() {
        let defs = definitions(&[("a", &["b"]), ("b", &[]), ("c", &[])]);
        let (graph, errors) = DependencyGraphResolver::build_graph(&defs);
        assert!(errors.is_empty());
        assert_eq!(graph.ids().collect::<Vec<_>>(), ["a", "b"]);
        assert!(graph.node("a").unwrap().depends_on().contains("b"));
        assert!(graph.node("b").unwrap().depended_by().contains("a"));
        assert!(graph.node("c").is_none());
    }

    #[test]
    fn test_unknown_dependency_reported() {
        let defs = definitions(&[("a", &["ghost", "b"]), ("b", &[])]);
        let (graph, errors) = DependencyGraphResolver::build_graph(&defs);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "services.a.dependencies");
        assert!(errors[0].message.contains("ghost"));
        assert!(graph.node("ghost").unwrap().depended_by().contains("a"));
        assert!(graph.node("a").unwrap().depends_on().contains("ghost"));
        assert!(graph.node("b").is_some());

        let catalog = ServiceCatalog::from_definitions(defs.into_values());
        let err = DependencyGraphResolver::resolve(&catalog).unwrap_err();
        assert_eq!(err.validation_errors().len(), 1);
    }

    #[test]
    fn test_diamond_order() {
        let defs = definitions(&[
            ("app", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let (graph, _) = DependencyGraphResolver::build_graph(&defs);
        let order = DependencyGraphResolver::dependency_order(&graph).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "base");
        assert_eq!(order[3], "app");
    }

    #[test]
    fn test_roots_of_one_pass_prepended_in_id_order() {
        let defs = definitions(&[("a", &["z"]), ("b", &["z"]), ("z", &[])]);
        let (graph, _) = DependencyGraphResolver::build_graph(&defs);
        let order = DependencyGraphResolver::dependency_order(&graph).unwrap();
        assert_eq!(order, ["z", "b", "a"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let defs = definitions(&[("a", &["b"]), ("b", &["a"]), ("c", &["a"])]);
        let (graph, _) = DependencyGraphResolver::build_graph(&defs);
        let cycle = DependencyGraphResolver::dependency_order(&graph).unwrap_err();
        // c is removed in the first pass; a and b never free up.
        assert_eq!(cycle.remaining, ["a", "b"]);
        assert_eq!(cycle.path, ["a", "b", "a"]);
        assert!(cycle.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let defs = definitions(&[("a", &["a"])]);
        let (graph, _) = DependencyGraphResolver::build_graph(&defs);
        let cycle = DependencyGraphResolver::dependency_order(&graph).unwrap_err();
        assert_eq!(cycle.path, ["a", "a"]);
    }

    #[test]
    fn test_sequence_goes_first() {
        let order = vec!["db".to_string(), "api".to_string()];
        let sequence: Vec<String> = ["metrics", "unknown", "api", "metrics"]
            .into_iter()
            .map(String::from)
            .collect();
        let known = ["api", "db", "logs", "metrics"];
        let result = DependencyGraphResolver::apply_sequence(order, &sequence, known);
        assert_eq!(result, ["metrics", "api", "db", "logs"]);
    }

    #[test]
    fn test_resolve_aggregates_errors() {
        let catalog = ServiceCatalog::from_definitions([
            ServiceDefinition::new("a").with_dependencies(["b"]),
            ServiceDefinition::new("b").with_dependencies(["a"]),
            ServiceDefinition::new("c").with_dependencies(["missing"]),
        ]);
        let err = DependencyGraphResolver::resolve(&catalog).unwrap_err();
        assert!(err.is_validation());
        let messages: Vec<_> = err
            .validation_errors()
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("missing")));
        assert!(messages
            .iter()
            .any(|m| m.contains('a') && m.contains('b') && m.contains("cycle")));
    }

    #[test]
    fn test_resolve_includes_unconnected_services() {
        let catalog = ServiceCatalog::from_definitions([
            ServiceDefinition::new("web").with_dependencies(["db"]),
            ServiceDefinition::new("db"),
            ServiceDefinition::new("audit"),
        ])
        .with_sequence(["audit"]);
        let order = DependencyGraphResolver::resolve(&catalog).unwrap();
        assert_eq!(order[0], "audit");
        assert!(position(&order, "db") < position(&order, "web"));
        assert_eq!(order.len(), 3);
    }
}
