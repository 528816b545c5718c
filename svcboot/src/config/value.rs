//! Raw configuration values.
//!
//! Every configuration source is reduced to a tree of [`ConfigValue`]s
//! before it enters the store. The byte-level format is irrelevant past
//! this point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A nested mapping from property name to value.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A single configuration value.
///
/// # Examples
///
/// ```
/// use svcboot::config::ConfigValue;
///
/// let value: ConfigValue = serde_json::from_str(r#"{"port": 8080, "hosts": ["a", "b"]}"#).unwrap();
/// let map = value.as_map().unwrap();
/// assert_eq!(map["port"].as_i64(), Some(8080));
/// assert_eq!(map["hosts"].as_list().map(Vec::len), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Absent value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<ConfigValue>),
    /// A nested mapping.
    Map(ConfigMap),
}

impl ConfigValue {
    /// Short name of the value's type, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns true for [`ConfigValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer value.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the number as a float, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the list if this is a list value.
    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<ConfigValue>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map if this is a map value.
    #[must_use]
    pub const fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the map mutably if this is a map value.
    pub fn as_map_mut(&mut self) -> Option<&mut ConfigMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Consumes the value, returning the map if this is a map value.
    #[must_use]
    pub fn into_map(self) -> Option<ConfigMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        Self::List(value)
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(value: ConfigMap) -> Self {
        Self::Map(value)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_covers_every_shape() {
        let value = ConfigValue::from(json!({
            "flag": true,
            "count": 3,
            "ratio": 0.5,
            "name": "cache",
            "items": [1, "two"],
            "nested": {"inner": null}
        }));
        let map = value.as_map().unwrap();
        assert_eq!(map["flag"].as_bool(), Some(true));
        assert_eq!(map["count"].as_i64(), Some(3));
        assert_eq!(map["ratio"].as_f64(), Some(0.5));
        assert_eq!(map["name"].as_str(), Some("cache"));
        assert_eq!(map["items"].as_list().unwrap().len(), 2);
        assert!(map["nested"].as_map().unwrap()["inner"].is_null());
    }

    #[test]
    fn test_deserialize_yaml() {
        let value: ConfigValue = serde_yaml::from_str("a:\n  b: [1, 2]\n  c: ~\n").unwrap();
        let a = value.as_map().unwrap()["a"].as_map().unwrap();
        assert_eq!(
            a["b"],
            ConfigValue::List(vec![ConfigValue::Integer(1), ConfigValue::Integer(2)])
        );
        assert!(a["c"].is_null());
    }

    #[test]
    fn test_serialize_roundtrips_through_json() {
        let value = ConfigValue::from(json!({"a": [1, {"b": "c"}], "d": null}));
        let text = serde_json::to_string(&value).unwrap();
        let back: ConfigValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_accessors_reject_other_types() {
        let value = ConfigValue::from("text");
        assert_eq!(value.as_i64(), None);
        assert_eq!(value.as_map(), None);
        assert_eq!(value.type_name(), "string");
        assert_eq!(ConfigValue::from(7).as_f64(), Some(7.0));
    }
}
