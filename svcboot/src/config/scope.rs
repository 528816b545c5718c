//! Configuration scopes.
//!
//! A [`Scope`] is one addressable unit of configuration. It is either a
//! [`MapScope`] (a root scope or a subset view into one) or a
//! [`CompositeScope`] presenting a primary and a fallback scope as one.
//!
//! Subset views never own data: they hold the root's storage and a prefix,
//! so a write through any view lands in the root and is recorded there as a
//! pending update. Read-only roots store their tree without a lock; writable
//! roots serialize writers behind a [`RwLock`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::sources::{ConfigurationManager, ManagerFeature};
use crate::config::value::{ConfigMap, ConfigValue};
use crate::error::{ConfigErrorKind, Error, Result};

/// A write recorded against a root scope, waiting to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    /// Full path of the written property, starting at the root scope.
    pub path: Vec<String>,
    /// The value written.
    pub value: ConfigValue,
}

/// Whether a scope accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Writes are accepted and recorded as pending updates.
    #[default]
    ReadWrite,
    /// Writes fail with a read-only error.
    ReadOnly,
}

enum Backing {
    Frozen(ConfigMap),
    Live(RwLock<LiveState>),
}

struct LiveState {
    data: ConfigMap,
    updates: Vec<PendingUpdate>,
}

struct Root {
    name: String,
    backing: Backing,
    manager: Option<Arc<dyn ConfigurationManager>>,
}

impl Root {
    fn read<R>(&self, f: impl FnOnce(&ConfigMap) -> R) -> R {
        match &self.backing {
            Backing::Frozen(data) => f(data),
            Backing::Live(state) => f(&state.read().data),
        }
    }

    fn pending(&self) -> Vec<PendingUpdate> {
        match &self.backing {
            Backing::Frozen(_) => Vec::new(),
            Backing::Live(state) => state.read().updates.clone(),
        }
    }

    fn drain_updates(&self, count: usize) {
        if let Backing::Live(state) = &self.backing {
            let mut state = state.write();
            let count = count.min(state.updates.len());
            state.updates.drain(..count);
        }
    }
}

fn descend<'a>(mut map: &'a ConfigMap, prefix: &[String]) -> Option<&'a ConfigMap> {
    for segment in prefix {
        map = map.get(segment)?.as_map()?;
    }
    Some(map)
}

fn descend_mut<'a>(mut map: &'a mut ConfigMap, prefix: &[String]) -> Option<&'a mut ConfigMap> {
    for segment in prefix {
        map = map.get_mut(segment)?.as_map_mut()?;
    }
    Some(map)
}

/// A map-backed scope: either a root or a subset view of one.
///
/// Cloning is cheap and yields a handle onto the same storage.
///
/// # Examples
///
/// ```
/// use svcboot::config::{ConfigValue, MapScope};
/// use serde_json::json;
///
/// let data = ConfigValue::from(json!({"db": {"host": "localhost"}})).into_map().unwrap();
/// let root = MapScope::new("App", data);
///
/// let db = root.subset("db").unwrap();
/// db.set("port", ConfigValue::from(5432)).unwrap();
///
/// // The write landed in the root, under the full path.
/// assert_eq!(root.pending_updates()[0].path, vec!["db", "port"]);
/// assert_eq!(db.get("port"), Some(ConfigValue::from(5432)));
/// ```
#[derive(Clone)]
pub struct MapScope {
    root: Arc<Root>,
    prefix: Vec<String>,
}

impl MapScope {
    /// Creates a writable root scope with no persistence backend.
    #[must_use]
    pub fn new(name: impl Into<String>, data: ConfigMap) -> Self {
        Self::with_options(name, data, Access::ReadWrite, None)
    }

    /// Creates a read-only root scope.
    #[must_use]
    pub fn read_only(name: impl Into<String>, data: ConfigMap) -> Self {
        Self::with_options(name, data, Access::ReadOnly, None)
    }

    /// Creates a root scope with explicit access and an optional manager
    /// that persists it.
    #[must_use]
    pub fn with_options(
        name: impl Into<String>,
        data: ConfigMap,
        access: Access,
        manager: Option<Arc<dyn ConfigurationManager>>,
    ) -> Self {
        let backing = match access {
            Access::ReadOnly => Backing::Frozen(data),
            Access::ReadWrite => Backing::Live(RwLock::new(LiveState {
                data,
                updates: Vec::new(),
            })),
        };
        Self {
            root: Arc::new(Root {
                name: name.into(),
                backing,
                manager,
            }),
            prefix: Vec::new(),
        }
    }

    /// Display name: the root name followed by the subset prefix.
    #[must_use]
    pub fn name(&self) -> String {
        if self.prefix.is_empty() {
            self.root.name.clone()
        } else {
            format!("{}.{}", self.root.name, self.prefix.join("."))
        }
    }

    /// Path of this view below its root. Empty for the root itself.
    #[must_use]
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Returns true if this scope is a subset view.
    #[must_use]
    pub fn is_subset(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// Returns the root scope this view belongs to.
    #[must_use]
    pub fn root(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            prefix: Vec::new(),
        }
    }

    fn view<R>(&self, f: impl FnOnce(Option<&ConfigMap>) -> R) -> R {
        self.root.read(|data| f(descend(data, &self.prefix)))
    }

    /// Returns true if the property is present, even when its value is null.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.view(|map| map.is_some_and(|m| m.contains_key(name)))
    }

    /// Names of every property directly in this scope.
    #[must_use]
    pub fn property_names(&self) -> BTreeSet<String> {
        self.view(|map| map.map(|m| m.keys().cloned().collect()).unwrap_or_default())
    }

    /// Returns a copy of the property's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        self.view(|map| map.and_then(|m| m.get(name).cloned()))
    }

    /// Returns a view of the nested map under `name`, if there is one.
    #[must_use]
    pub fn subset(&self, name: &str) -> Option<Self> {
        let nested = self.view(|map| {
            map.and_then(|m| m.get(name))
                .is_some_and(|value| value.as_map().is_some())
        });
        nested.then(|| {
            let mut prefix = self.prefix.clone();
            prefix.push(name.to_string());
            Self {
                root: Arc::clone(&self.root),
                prefix,
            }
        })
    }

    /// Returns a copy of the whole tree visible through this scope.
    #[must_use]
    pub fn to_map(&self) -> ConfigMap {
        self.view(|map| map.cloned().unwrap_or_default())
    }

    /// Returns true if this scope accepts writes.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        matches!(self.root.backing, Backing::Live(_))
    }

    /// Returns true if [`MapScope::save`] can succeed.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.root.manager.as_ref().is_some_and(|manager| {
            manager.supports(ManagerFeature::Save) || manager.supports(ManagerFeature::Update)
        })
    }

    /// Writes a property and records it as a pending update on the root.
    ///
    /// # Errors
    ///
    /// Returns a read-only error if the root is immutable, or an invalid
    /// configuration error if this view no longer points at a map.
    pub fn set(&self, name: &str, value: ConfigValue) -> Result<()> {
        let Backing::Live(state) = &self.root.backing else {
            return Err(Error::configuration(
                ConfigErrorKind::ReadOnly,
                format!("scope '{}' is read-only", self.name()),
            ));
        };

        let mut state = state.write();
        let target = descend_mut(&mut state.data, &self.prefix).ok_or_else(|| {
            Error::configuration(
                ConfigErrorKind::Invalid,
                format!("scope '{}' is no longer a map", self.name()),
            )
        })?;
        target.insert(name.to_string(), value.clone());

        let mut path = self.prefix.clone();
        path.push(name.to_string());
        state.updates.push(PendingUpdate { path, value });
        Ok(())
    }

    /// Writes not yet persisted, recorded on the root.
    #[must_use]
    pub fn pending_updates(&self) -> Vec<PendingUpdate> {
        self.root.pending()
    }

    /// Persists the root scope through its manager.
    ///
    /// A manager that can save receives the full tree; one that can only
    /// update receives the pending updates. Persisted updates are dropped
    /// from the pending list.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error if there is no manager or it
    /// supports neither operation, or whatever the manager reports.
    pub fn save(&self) -> Result<()> {
        let root = &self.root;
        let Some(manager) = root.manager.as_ref() else {
            return Err(Error::configuration(
                ConfigErrorKind::Unsupported,
                format!("scope '{}' has no backing manager", root.name),
            ));
        };

        if manager.supports(ManagerFeature::Save) {
            let (snapshot, sent) = match &root.backing {
                Backing::Frozen(data) => (data.clone(), 0),
                Backing::Live(state) => {
                    let state = state.read();
                    (state.data.clone(), state.updates.len())
                }
            };
            manager.save(&root.name, &snapshot)?;
            root.drain_updates(sent);
            Ok(())
        } else if manager.supports(ManagerFeature::Update) {
            let pending = root.pending();
            manager.update(&root.name, &pending)?;
            root.drain_updates(pending.len());
            Ok(())
        } else {
            Err(Error::configuration(
                ConfigErrorKind::Unsupported,
                format!(
                    "manager '{}' cannot persist scope '{}'",
                    manager.name(),
                    root.name
                ),
            ))
        }
    }

    /// Identity of the root storage, shared by every view of it.
    pub(crate) fn root_key(&self) -> usize {
        Arc::as_ptr(&self.root) as usize
    }

    /// Builds a new root from a transformed copy of this root's tree.
    ///
    /// Name, access, manager and pending updates carry over.
    pub(crate) fn derive_root(&self, transform: impl FnOnce(ConfigMap) -> ConfigMap) -> Self {
        let root = &self.root;
        let backing = match &root.backing {
            Backing::Frozen(data) => Backing::Frozen(transform(data.clone())),
            Backing::Live(state) => {
                let state = state.read();
                Backing::Live(RwLock::new(LiveState {
                    data: transform(state.data.clone()),
                    updates: state.updates.clone(),
                }))
            }
        };
        Self {
            root: Arc::new(Root {
                name: root.name.clone(),
                backing,
                manager: root.manager.clone(),
            }),
            prefix: Vec::new(),
        }
    }

    /// The same view, re-pointed at another root.
    pub(crate) fn rebased(&self, root: &Self) -> Self {
        Self {
            root: Arc::clone(&root.root),
            prefix: self.prefix.clone(),
        }
    }
}

impl PartialEq for MapScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root) && self.prefix == other.prefix
    }
}

impl fmt::Debug for MapScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapScope")
            .field("name", &self.name())
            .field("mutable", &self.is_mutable())
            .finish()
    }
}

struct Members {
    primary: Scope,
    fallback: Scope,
}

/// A read-through union of a primary and a fallback scope.
///
/// Lookups consult the primary first. Writes go to the primary if it
/// accepts them, otherwise to the nearest writable scope down the fallback
/// chain.
///
/// # Examples
///
/// ```
/// use svcboot::config::{CompositeScope, ConfigValue, MapScope, Scope};
/// use serde_json::json;
///
/// let primary = MapScope::new("override", ConfigValue::from(json!({"k": 3})).into_map().unwrap());
/// let fallback = MapScope::new("defaults", ConfigValue::from(json!({"k": 5, "j": 1})).into_map().unwrap());
/// let composite = CompositeScope::new(primary.into(), fallback.into());
///
/// assert_eq!(composite.get("k"), Some(ConfigValue::from(3)));
/// assert_eq!(composite.get("j"), Some(ConfigValue::from(1)));
/// ```
#[derive(Clone)]
pub struct CompositeScope {
    members: Arc<Members>,
}

impl CompositeScope {
    /// Composes two scopes, `primary` taking precedence.
    #[must_use]
    pub fn new(primary: Scope, fallback: Scope) -> Self {
        Self {
            members: Arc::new(Members { primary, fallback }),
        }
    }

    /// The scope consulted first.
    #[must_use]
    pub fn primary(&self) -> &Scope {
        &self.members.primary
    }

    /// The scope consulted when the primary lacks a property.
    #[must_use]
    pub fn fallback(&self) -> &Scope {
        &self.members.fallback
    }

    /// A composite with the primary replaced.
    #[must_use]
    pub fn with_primary(&self, primary: Scope) -> Self {
        Self::new(primary, self.members.fallback.clone())
    }

    /// A composite with the fallback replaced.
    #[must_use]
    pub fn with_fallback(&self, fallback: Scope) -> Self {
        Self::new(self.members.primary.clone(), fallback)
    }

    /// Returns true if either member has the property.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.members.primary.contains(name) || self.members.fallback.contains(name)
    }

    /// Union of both members' property names.
    #[must_use]
    pub fn property_names(&self) -> BTreeSet<String> {
        let mut names = self.members.primary.property_names();
        names.extend(self.members.fallback.property_names());
        names
    }

    /// Reads from the primary if it has the property, else the fallback.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        if self.members.primary.contains(name) {
            self.members.primary.get(name)
        } else {
            self.members.fallback.get(name)
        }
    }

    /// Composes the members' subsets.
    ///
    /// When only one member has a nested map under `name`, that member's
    /// subset is returned on its own.
    #[must_use]
    pub fn subset(&self, name: &str) -> Option<Scope> {
        let fallback = self.members.fallback.subset(name);
        match (self.members.primary.subset(name), fallback) {
            (Some(primary), Some(fallback)) => Some(Self::new(primary, fallback).into()),
            (Some(primary), None) => Some(primary),
            (None, fallback) => fallback,
        }
    }

    /// Writes through to the nearest writable member.
    ///
    /// # Errors
    ///
    /// Returns a read-only error if no member accepts writes.
    pub fn set(&self, name: &str, value: ConfigValue) -> Result<()> {
        match self.write_target() {
            Some(target) => target.set(name, value),
            None => Err(Error::configuration(
                ConfigErrorKind::ReadOnly,
                format!("no member of composite scope '{}' is writable", self.name()),
            )),
        }
    }

    fn write_target(&self) -> Option<MapScope> {
        self.members
            .primary
            .write_target()
            .or_else(|| self.members.fallback.write_target())
    }

    /// Display name, taken from the primary.
    #[must_use]
    pub fn name(&self) -> String {
        self.members.primary.name()
    }
}

impl PartialEq for CompositeScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.members, &other.members)
            || (self.members.primary == other.members.primary
                && self.members.fallback == other.members.fallback)
    }
}

impl fmt::Debug for CompositeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeScope")
            .field("primary", &self.members.primary)
            .field("fallback", &self.members.fallback)
            .finish()
    }
}

/// One addressable unit of configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    /// A root scope or a subset view of one.
    Map(MapScope),
    /// A primary/fallback composition.
    Composite(CompositeScope),
}

impl From<MapScope> for Scope {
    fn from(scope: MapScope) -> Self {
        Self::Map(scope)
    }
}

impl From<CompositeScope> for Scope {
    fn from(scope: CompositeScope) -> Self {
        Self::Composite(scope)
    }
}

impl Scope {
    /// Display name of the scope.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Map(scope) => scope.name(),
            Self::Composite(scope) => scope.name(),
        }
    }

    /// Returns true if the property is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::Map(scope) => scope.contains(name),
            Self::Composite(scope) => scope.contains(name),
        }
    }

    /// Names of every property directly visible in this scope.
    #[must_use]
    pub fn property_names(&self) -> BTreeSet<String> {
        match self {
            Self::Map(scope) => scope.property_names(),
            Self::Composite(scope) => scope.property_names(),
        }
    }

    /// Returns a copy of the property's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        match self {
            Self::Map(scope) => scope.get(name),
            Self::Composite(scope) => scope.get(name),
        }
    }

    /// Returns the nested scope under `name`, if the value there is a map.
    #[must_use]
    pub fn subset(&self, name: &str) -> Option<Self> {
        match self {
            Self::Map(scope) => scope.subset(name).map(Self::Map),
            Self::Composite(scope) => scope.subset(name),
        }
    }

    /// Writes a property.
    ///
    /// # Errors
    ///
    /// Returns a read-only error if the scope does not accept writes.
    pub fn set(&self, name: &str, value: ConfigValue) -> Result<()> {
        match self {
            Self::Map(scope) => scope.set(name, value),
            Self::Composite(scope) => scope.set(name, value),
        }
    }

    /// Returns true if some write to this scope can succeed.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.write_target().is_some()
    }

    /// Returns true if [`Scope::save`] can succeed.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        match self {
            Self::Map(scope) => scope.is_persistent(),
            Self::Composite(_) => self.write_target().is_some_and(|t| t.is_persistent()),
        }
    }

    /// Persists the scope that receives this scope's writes.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error if nothing can be persisted.
    pub fn save(&self) -> Result<()> {
        match self {
            Self::Map(scope) => scope.save(),
            Self::Composite(composite) => match self.write_target() {
                Some(target) => target.save(),
                None => Err(Error::configuration(
                    ConfigErrorKind::Unsupported,
                    format!("composite scope '{}' has nothing to save", composite.name()),
                )),
            },
        }
    }

    /// Merged copy of everything visible through this scope.
    ///
    /// For a composite, the primary's entries win; nested maps present in
    /// both members are merged recursively.
    #[must_use]
    pub fn to_map(&self) -> ConfigMap {
        match self {
            Self::Map(scope) => scope.to_map(),
            Self::Composite(scope) => {
                let mut merged = ConfigMap::new();
                for name in scope.property_names() {
                    let value = match scope.subset(&name) {
                        Some(nested) if scope.get(&name).is_some_and(|v| v.as_map().is_some()) => {
                            ConfigValue::Map(nested.to_map())
                        }
                        _ => scope.get(&name).unwrap_or_default(),
                    };
                    merged.insert(name, value);
                }
                merged
            }
        }
    }

    /// Pending updates of the scope that receives this scope's writes.
    #[must_use]
    pub fn pending_updates(&self) -> Vec<PendingUpdate> {
        self.write_target()
            .map(|target| target.pending_updates())
            .unwrap_or_default()
    }

    fn write_target(&self) -> Option<MapScope> {
        match self {
            Self::Map(scope) => scope.is_mutable().then(|| scope.clone()),
            Self::Composite(scope) => scope.write_target(),
        }
    }

    /// Rebuilds the scope with every map member replaced by `remap`.
    pub(crate) fn map_members(&self, remap: &mut impl FnMut(&MapScope) -> MapScope) -> Self {
        match self {
            Self::Map(scope) => Self::Map(remap(scope)),
            Self::Composite(scope) => {
                let primary = scope.primary().map_members(remap);
                let fallback = scope.fallback().map_members(remap);
                Self::Composite(CompositeScope::new(primary, fallback))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> ConfigMap {
        ConfigValue::from(value).into_map().unwrap()
    }

    fn composite(primary: serde_json::Value, fallback: serde_json::Value) -> Scope {
        CompositeScope::new(
            MapScope::new("primary", data(primary)).into(),
            MapScope::new("fallback", data(fallback)).into(),
        )
        .into()
    }

    #[test]
    fn test_subset_only_for_maps() {
        let scope = MapScope::new("App", data(json!({"db": {"host": "h"}, "port": 1})));
        assert!(scope.subset("db").is_some());
        assert!(scope.subset("port").is_none());
        assert!(scope.subset("missing").is_none());
        assert_eq!(scope.subset("db").unwrap().name(), "App.db");
    }

    #[test]
    fn test_subset_writes_reach_root() {
        let root = MapScope::new("App", data(json!({"a": {"b": {"c": 1}}})));
        let b = root.subset("a").unwrap().subset("b").unwrap();
        b.set("d", ConfigValue::from(2)).unwrap();

        let a = root.subset("a").unwrap();
        assert_eq!(a.subset("b").unwrap().get("d"), Some(ConfigValue::from(2)));
        assert_eq!(
            root.pending_updates(),
            vec![PendingUpdate {
                path: vec!["a".into(), "b".into(), "d".into()],
                value: ConfigValue::from(2),
            }]
        );
        // Views see the same pending list as their root.
        assert_eq!(b.pending_updates().len(), 1);
    }

    #[test]
    fn test_write_adds_to_name_set() {
        let scope = MapScope::new("App", ConfigMap::new());
        assert!(scope.property_names().is_empty());
        scope.set("fresh", ConfigValue::from(true)).unwrap();
        assert!(scope.property_names().contains("fresh"));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let scope = MapScope::read_only("Frozen", data(json!({"a": 1})));
        let err = scope.set("a", ConfigValue::from(2)).unwrap_err();
        assert!(err.is_configuration(ConfigErrorKind::ReadOnly));
        assert_eq!(scope.get("a"), Some(ConfigValue::from(1)));
    }

    #[test]
    fn test_save_without_manager_unsupported() {
        let scope = MapScope::new("App", ConfigMap::new());
        assert!(!scope.is_persistent());
        let err = scope.save().unwrap_err();
        assert!(err.is_configuration(ConfigErrorKind::Unsupported));
    }

    #[test]
    fn test_composite_read_through() {
        let scope = composite(json!({}), json!({"K": 5}));
        assert_eq!(scope.get("K"), Some(ConfigValue::from(5)));

        let scope = composite(json!({"K": 3}), json!({"K": 5}));
        assert_eq!(scope.get("K"), Some(ConfigValue::from(3)));
    }

    #[test]
    fn test_composite_names_are_union() {
        let scope = composite(json!({"a": 1, "b": 2}), json!({"b": 3, "c": 4}));
        let names: Vec<_> = scope.property_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_composite_names_follow_member_replacement() {
        let Scope::Composite(scope) = composite(json!({"a": 1}), json!({"b": 2})) else {
            unreachable!()
        };
        let replaced = scope.with_fallback(MapScope::new("other", data(json!({"z": 0}))).into());
        assert!(replaced.property_names().contains("z"));
        assert!(!replaced.property_names().contains("b"));
    }

    #[test]
    fn test_composite_subset_merges_members() {
        let scope = composite(
            json!({"db": {"host": "primary"}}),
            json!({"db": {"host": "fallback", "port": 5432}, "cache": {"size": 1}}),
        );
        let db = scope.subset("db").unwrap();
        assert_eq!(db.get("host"), Some(ConfigValue::from("primary")));
        assert_eq!(db.get("port"), Some(ConfigValue::from(5432)));
        assert!(matches!(scope.subset("cache"), Some(Scope::Map(_))));
    }

    #[test]
    fn test_composite_writes_skip_read_only_primary() {
        let primary = MapScope::read_only("ro", data(json!({"a": 1})));
        let fallback = MapScope::new("rw", data(json!({})));
        let scope: Scope = CompositeScope::new(primary.into(), fallback.clone().into()).into();

        scope.set("b", ConfigValue::from(2)).unwrap();
        assert_eq!(fallback.get("b"), Some(ConfigValue::from(2)));
        assert_eq!(scope.get("b"), Some(ConfigValue::from(2)));
    }

    #[test]
    fn test_composite_walks_nested_fallbacks() {
        let inner: Scope = CompositeScope::new(
            MapScope::read_only("ro2", ConfigMap::new()).into(),
            MapScope::new("rw", ConfigMap::new()).into(),
        )
        .into();
        let outer: Scope =
            CompositeScope::new(MapScope::read_only("ro1", ConfigMap::new()).into(), inner).into();

        assert!(outer.is_mutable());
        outer.set("x", ConfigValue::from(1)).unwrap();
        assert_eq!(outer.get("x"), Some(ConfigValue::from(1)));
        assert_eq!(outer.pending_updates().len(), 1);
    }

    #[test]
    fn test_composite_all_read_only() {
        let scope: Scope = CompositeScope::new(
            MapScope::read_only("a", ConfigMap::new()).into(),
            MapScope::read_only("b", ConfigMap::new()).into(),
        )
        .into();
        assert!(!scope.is_mutable());
        let err = scope.set("x", ConfigValue::Null).unwrap_err();
        assert!(err.is_configuration(ConfigErrorKind::ReadOnly));
    }

    #[test]
    fn test_composite_to_map_merges() {
        let scope = composite(
            json!({"a": 1, "n": {"x": 1}}),
            json!({"a": 2, "b": 3, "n": {"y": 2}}),
        );
        assert_eq!(
            ConfigValue::Map(scope.to_map()),
            ConfigValue::from(json!({"a": 1, "b": 3, "n": {"x": 1, "y": 2}}))
        );
    }

    #[test]
    fn test_scope_equality_is_identity() {
        let root = MapScope::new("App", data(json!({"a": {}})));
        assert_eq!(root.subset("a"), root.subset("a"));
        let twin = MapScope::new("App", data(json!({"a": {}})));
        assert_ne!(root, twin);
    }
}
