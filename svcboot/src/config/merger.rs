//! Deep merging of raw configuration trees.
//!
//! File-location sources are merged left to right: each later source is
//! merged into the accumulated result of the earlier ones.

use crate::config::value::{ConfigMap, ConfigValue};

/// Merges raw configuration trees according to precedence rules.
///
/// # Merging Rules
///
/// - Map into map: recurse key by key
/// - List into list: the newer list's items come first, followed by the older ones
/// - Anything else: the newer value replaces the older one
///
/// # Examples
///
/// ```
/// use svcboot::config::{ConfigMerger, ConfigValue};
/// use serde_json::json;
///
/// let low = ConfigValue::from(json!({"db": {"host": "localhost", "port": 5432}}));
/// let high = ConfigValue::from(json!({"db": {"host": "db.internal"}}));
///
/// let merged = ConfigMerger::merge(vec![low.into_map().unwrap(), high.into_map().unwrap()]);
/// let db = merged["db"].as_map().unwrap();
/// assert_eq!(db["host"].as_str(), Some("db.internal"));
/// assert_eq!(db["port"].as_i64(), Some(5432));
/// ```
pub struct ConfigMerger;

impl ConfigMerger {
    /// Merge multiple trees into one.
    ///
    /// Sources should be provided in order from lowest to highest precedence.
    #[must_use]
    pub fn merge(sources: Vec<ConfigMap>) -> ConfigMap {
        let mut result = ConfigMap::new();
        for source in sources {
            Self::merge_into(&mut result, source);
        }
        result
    }

    /// Merge `source` into `target` (source wins on conflicts).
    pub fn merge_into(target: &mut ConfigMap, source: ConfigMap) {
        for (key, incoming) in source {
            match target.remove(&key) {
                Some(existing) => {
                    target.insert(key, Self::merge_values(existing, incoming));
                }
                None => {
                    target.insert(key, incoming);
                }
            }
        }
    }

    fn merge_values(existing: ConfigValue, incoming: ConfigValue) -> ConfigValue {
        match (existing, incoming) {
            (ConfigValue::Map(mut base), ConfigValue::Map(overlay)) => {
                Self::merge_into(&mut base, overlay);
                ConfigValue::Map(base)
            }
            (ConfigValue::List(older), ConfigValue::List(mut newer)) => {
                newer.extend(older);
                ConfigValue::List(newer)
            }
            (_, incoming) => incoming,
        }
    }
}
