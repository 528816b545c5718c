//! Property-based tests for dependency ordering.

use std::collections::BTreeMap;

use super::catalog::ServiceCatalog;
use super::definition::ServiceDefinition;
use super::graph::DependencyGraphResolver;
use proptest::prelude::*;

// Random DAG: service `s{i}` may only depend on services with a smaller index.
fn acyclic_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|count| {
        (0..count)
            .map(|i| prop::collection::vec(0..i.max(1), 0..=i.min(4)))
            .collect::<Vec<_>>()
    })
}

fn name(i: usize) -> String {
    format!("s{i}")
}

fn catalog(graph: &[Vec<usize>], sequence: &[usize]) -> ServiceCatalog {
    ServiceCatalog::from_definitions(graph.iter().enumerate().map(|(i, deps)| {
        ServiceDefinition::new(name(i)).with_dependencies(deps.iter().map(|d| name(*d)))
    }))
    .with_sequence(sequence.iter().map(|i| name(*i)))
}

fn positions(order: &[String]) -> BTreeMap<&str, usize> {
    order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    // Every dependency precedes its dependents and every service appears once
    #[test]
    fn prop_dependencies_come_first(graph in acyclic_strategy()) {
        let order = DependencyGraphResolver::resolve(&catalog(&graph, &[])).unwrap();
        prop_assert_eq!(order.len(), graph.len());

        let position = positions(&order);
        prop_assert_eq!(position.len(), graph.len());
        for (i, deps) in graph.iter().enumerate() {
            for dep in deps {
                prop_assert!(position[name(*dep).as_str()] < position[name(i).as_str()]);
            }
        }
    }

    // Ordering does not depend on anything but the graph
    #[test]
    fn prop_order_is_deterministic(graph in acyclic_strategy()) {
        let first = DependencyGraphResolver::resolve(&catalog(&graph, &[])).unwrap();
        let second = DependencyGraphResolver::resolve(&catalog(&graph, &[])).unwrap();
        prop_assert_eq!(first, second);
    }

    // An explicitly sequenced service always comes first
    #[test]
    fn prop_sequence_leads(graph in acyclic_strategy(), pick in any::<prop::sample::Index>()) {
        let chosen = pick.index(graph.len());
        let order = DependencyGraphResolver::resolve(&catalog(&graph, &[chosen])).unwrap();
        prop_assert_eq!(&order[0], &name(chosen));
        prop_assert_eq!(order.len(), graph.len());
    }

    // Closing a dependency chain into a loop is always reported
    #[test]
    fn prop_cycle_detected(length in 1usize..8) {
        let graph: Vec<Vec<usize>> = (0..length).map(|i| vec![(i + 1) % length]).collect();
        let err = DependencyGraphResolver::resolve(&catalog(&graph, &[])).unwrap_err();
        prop_assert!(err.is_validation());
        let message = err.to_string();
        for i in 0..length {
            prop_assert!(message.contains(&name(i)));
        }
    }
}
