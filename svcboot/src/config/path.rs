//! Property path addressing.
//!
//! A property path names a value inside a scope, one segment per nesting
//! level. The dotted form `"a.b.c"` and the segment form `["a", "b", "c"]`
//! are interchangeable everywhere a path is accepted.

use std::fmt;

use crate::config::scope::Scope;
use crate::config::value::ConfigValue;
use crate::error::{ConfigErrorKind, Error, Result};

/// An ordered list of property-name segments.
///
/// # Examples
///
/// ```
/// use svcboot::config::PropertyPath;
///
/// let dotted = PropertyPath::from("db.primary.host");
/// let listed = PropertyPath::from(vec!["db", "primary", "host"]);
/// assert_eq!(dotted, listed);
/// assert_eq!(dotted.to_string(), "db.primary.host");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    /// Creates a path from explicit segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Splits a dotted path. The empty string is the empty path.
    #[must_use]
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::default();
        }
        Self::new(dotted.split('.'))
    }

    /// Reads a path from a configuration value: a dotted string or a list
    /// of strings.
    #[must_use]
    pub fn from_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::String(dotted) => Some(Self::parse(dotted)),
            ConfigValue::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self),
            _ => None,
        }
    }

    /// The path's segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns true for the empty path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for PropertyPath {
    fn from(dotted: &str) -> Self {
        Self::parse(dotted)
    }
}

impl From<String> for PropertyPath {
    fn from(dotted: String) -> Self {
        Self::parse(&dotted)
    }
}

impl From<Vec<String>> for PropertyPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for PropertyPath {
    fn from(segments: Vec<&str>) -> Self {
        Self::new(segments)
    }
}

impl From<&[&str]> for PropertyPath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for PropertyPath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<&PropertyPath> for PropertyPath {
    fn from(path: &PropertyPath) -> Self {
        path.clone()
    }
}

/// Outcome of resolving a path against a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Every intermediate segment named a nested scope.
    Resolved {
        /// The scope owning the leaf.
        scope: Scope,
        /// The final segment; `None` for the empty path.
        leaf: Option<String>,
    },
    /// Some intermediate segment did not name a nested scope.
    Unresolved {
        /// The last scope successfully reached.
        reached: Scope,
        /// Segments from the first unresolvable one to the end.
        remaining: Vec<String>,
    },
}

impl Resolution {
    /// The owning scope, if resolution succeeded.
    #[must_use]
    pub fn scope(&self) -> Option<&Scope> {
        match self {
            Self::Resolved { scope, .. } => Some(scope),
            Self::Unresolved { .. } => None,
        }
    }

    /// The leaf segment, if resolution succeeded and the path was not empty.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        match self {
            Self::Resolved { leaf, .. } => leaf.as_deref(),
            Self::Unresolved { .. } => None,
        }
    }

    /// Returns true if resolution succeeded.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Navigates property paths through nested scopes.
pub struct PropertyPathResolver;

impl PropertyPathResolver {
    /// Finds the scope responsible for the path's final segment.
    ///
    /// Paths of zero or one segment are owned by `root` itself. Longer
    /// paths descend one subset per intermediate segment; the final
    /// segment is never descended into.
    ///
    /// # Examples
    ///
    /// ```
    /// use svcboot::config::{ConfigValue, MapScope, PropertyPath, PropertyPathResolver, Scope};
    /// use serde_json::json;
    ///
    /// let data = ConfigValue::from(json!({"a": {"b": {"c": 1}}})).into_map().unwrap();
    /// let root: Scope = MapScope::new("App", data).into();
    ///
    /// let resolution = PropertyPathResolver::resolve(&root, &PropertyPath::from("a.b.c"));
    /// assert_eq!(resolution.scope().unwrap().name(), "App.a.b");
    /// assert_eq!(resolution.leaf(), Some("c"));
    /// ```
    #[must_use]
    pub fn resolve(root: &Scope, path: &PropertyPath) -> Resolution {
        let segments = path.segments();
        let Some((leaf, intermediate)) = segments.split_last() else {
            return Resolution::Resolved {
                scope: root.clone(),
                leaf: None,
            };
        };

        let mut current = root.clone();
        for (index, segment) in intermediate.iter().enumerate() {
            match current.subset(segment) {
                Some(next) => current = next,
                None => {
                    return Resolution::Unresolved {
                        reached: current,
                        remaining: segments[index..].to_vec(),
                    }
                }
            }
        }

        Resolution::Resolved {
            scope: current,
            leaf: Some(leaf.clone()),
        }
    }

    /// Reads the value at `path`.
    ///
    /// The empty path yields the whole tree of `root`. An unresolvable path
    /// yields `None`.
    #[must_use]
    pub fn get_value(root: &Scope, path: &PropertyPath) -> Option<ConfigValue> {
        match Self::resolve(root, path) {
            Resolution::Resolved {
                scope,
                leaf: Some(leaf),
            } => scope.get(&leaf),
            Resolution::Resolved { scope, leaf: None } => Some(ConfigValue::Map(scope.to_map())),
            Resolution::Unresolved { .. } => None,
        }
    }

    /// Writes `value` at `path`.
    ///
    /// # Errors
    ///
    /// Returns a missing-configuration error if the path cannot be
    /// resolved, a read-only error if the owning scope is immutable, or an
    /// invalid-configuration error for the empty path.
    pub fn set_value(root: &Scope, path: &PropertyPath, value: ConfigValue) -> Result<()> {
        match Self::resolve(root, path) {
            Resolution::Resolved {
                scope,
                leaf: Some(leaf),
            } => scope.set(&leaf, value),
            Resolution::Resolved { leaf: None, .. } => Err(Error::configuration(
                ConfigErrorKind::Invalid,
                format!("cannot write an empty path in scope '{}'", root.name()),
            )),
            Resolution::Unresolved { reached, remaining } => Err(Error::configuration(
                ConfigErrorKind::Missing,
                format!(
                    "no configuration for '{path}': '{}' has no scope '{}'",
                    reached.name(),
                    remaining.first().map_or("", String::as_str)
                ),
            )),
        }
    }
}
