//! Property-based tests for scopes, paths and merging.

use super::merger::ConfigMerger;
use super::path::{PropertyPath, PropertyPathResolver};
use super::scope::{CompositeScope, MapScope, Scope};
use super::value::{ConfigMap, ConfigValue};
use proptest::prelude::*;

// Strategy for generating property names (no dots, so dotted form is unambiguous)
fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

fn segments_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment_strategy(), 1..6)
}

fn scalar_strategy() -> impl Strategy<Value = ConfigValue> {
    prop_oneof![
        any::<bool>().prop_map(ConfigValue::from),
        any::<i64>().prop_map(ConfigValue::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(ConfigValue::from),
    ]
}

fn flat_map_strategy() -> impl Strategy<Value = ConfigMap> {
    prop::collection::btree_map(segment_strategy(), scalar_strategy(), 0..8)
}

// Builds `{s0: {s1: {... {leaf: value}}}}` along the given segments.
fn nested(segments: &[String], value: ConfigValue) -> ConfigMap {
    let (leaf, parents) = segments.split_last().expect("non-empty segments");
    let mut map = ConfigMap::new();
    map.insert(leaf.clone(), value);
    for parent in parents.iter().rev() {
        let mut outer = ConfigMap::new();
        outer.insert(parent.clone(), ConfigValue::Map(map));
        map = outer;
    }
    map
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 2000,
        max_shrink_iters: 2000,
        .. ProptestConfig::default()
    })]

    // Dotted and segmented paths address the same property
    #[test]
    fn dotted_and_segmented_paths_agree(
        segments in segments_strategy(),
        value in scalar_strategy()
    ) {
        let root: Scope = MapScope::new("App", nested(&segments, value.clone())).into();
        let dotted = PropertyPath::parse(&segments.join("."));
        let listed = PropertyPath::new(segments.clone());

        prop_assert_eq!(&dotted, &listed);
        prop_assert_eq!(PropertyPathResolver::get_value(&root, &dotted), Some(value.clone()));
        prop_assert_eq!(PropertyPathResolver::get_value(&root, &listed), Some(value));
    }

    // A write through a resolvable path is visible to the next read
    #[test]
    fn set_then_get(
        segments in segments_strategy(),
        old in scalar_strategy(),
        new in scalar_strategy()
    ) {
        let root: Scope = MapScope::new("App", nested(&segments, old)).into();
        let path = PropertyPath::new(segments);

        PropertyPathResolver::set_value(&root, &path, new.clone()).unwrap();
        prop_assert_eq!(PropertyPathResolver::get_value(&root, &path), Some(new));
    }

    // Writes to a read-only root never change it
    #[test]
    fn read_only_roots_unchanged(
        segments in segments_strategy(),
        old in scalar_strategy(),
        new in scalar_strategy()
    ) {
        let root: Scope = MapScope::read_only("App", nested(&segments, old.clone())).into();
        let path = PropertyPath::new(segments);

        prop_assert!(PropertyPathResolver::set_value(&root, &path, new).is_err());
        prop_assert_eq!(PropertyPathResolver::get_value(&root, &path), Some(old));
    }

    // A composite answers from its primary first, then its fallback
    #[test]
    fn composite_prefers_primary(primary in flat_map_strategy(), fallback in flat_map_strategy()) {
        let scope = CompositeScope::new(
            MapScope::new("App", primary.clone()).into(),
            MapScope::new("App", fallback.clone()).into(),
        );

        for (key, value) in &primary {
            prop_assert_eq!(scope.get(key), Some(value.clone()));
        }
        for (key, value) in fallback.iter().filter(|(k, _)| !primary.contains_key(*k)) {
            prop_assert_eq!(scope.get(key), Some(value.clone()));
        }
        prop_assert_eq!(
            scope.property_names().len(),
            primary.keys().chain(fallback.keys()).collect::<std::collections::BTreeSet<_>>().len()
        );
    }

    // Scalars from the later source always win a merge
    #[test]
    fn merge_later_scalars_win(low in flat_map_strategy(), high in flat_map_strategy()) {
        let merged = ConfigMerger::merge(vec![low.clone(), high.clone()]);

        for (key, value) in &high {
            prop_assert_eq!(merged.get(key), Some(value));
        }
        for (key, value) in low.iter().filter(|(k, _)| !high.contains_key(*k)) {
            prop_assert_eq!(merged.get(key), Some(value));
        }
    }

    // Merging a composite's members reproduces what the composite shows
    #[test]
    fn composite_to_map_matches_merge(
        primary in flat_map_strategy(),
        fallback in flat_map_strategy()
    ) {
        let composite: Scope = CompositeScope::new(
            MapScope::new("App", primary.clone()).into(),
            MapScope::new("App", fallback.clone()).into(),
        )
        .into();

        prop_assert_eq!(composite.to_map(), ConfigMerger::merge(vec![fallback, primary]));
    }
}
