//! The layered configuration store.
//!
//! A [`ConfigurationStore`] maps scope names to [`Scope`]s. It is assembled
//! by [`ConfigurationStoreBuilder`] in four steps:
//!
//! 1. Every top-level entry of the bootstrap source becomes a root scope.
//! 2. Each configuration manager's updates are applied in order. An overlay
//!    for an existing scope becomes the primary of a composite over it.
//! 3. Placeholders are expanded once, against a snapshot of the merged
//!    scopes, and every root is re-derived from its expanded tree.
//! 4. The finished map of scopes is published.
//!
//! After bootstrap, scopes can still be written through
//! [`ConfigurationStore::set_value`] and replaced through
//! [`ConfigurationStore::apply`].

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::config::loader::ConfigLoader;
use crate::config::path::{PropertyPath, PropertyPathResolver};
use crate::config::placeholder::{EnvKeywordHandler, KeywordHandler, PlaceholderExpander};
use crate::config::scope::{Access, CompositeScope, MapScope, Scope};
use crate::config::sources::{
    ConfigurationManager, EnvironmentFileLocation, FileConfigurationManager, FileLocationPlugin,
    SettingFileLocation, UserFileLocation,
};
use crate::config::value::{ConfigMap, ConfigValue};
use crate::error::{ConfigErrorKind, Error, Result};

/// Scope holding settings for the configuration system itself.
pub const CONFIGURATION_SERVICE_SCOPE: &str = "ConfigurationService";

/// Setting listing manager names in load order.
pub const MANAGER_SEQUENCE_SETTING: &str = "manager-sequence";

/// Environment variable naming the bootstrap file.
pub const BOOTSTRAP_PATH_ENV: &str = "SVCBOOT_BOOTSTRAP_PATH";

/// Bootstrap file looked up in the working directory by default.
pub const DEFAULT_BOOTSTRAP_FILE: &str = "config-service-config.json";

const PROPERTY_KEY: &str = "property";
const VALUE_KEY: &str = "value";

/// Named configuration scopes shared by every service.
///
/// # Examples
///
/// ```
/// use svcboot::config::{ConfigValue, ConfigurationStore};
/// use serde_json::json;
///
/// let bootstrap = ConfigValue::from(json!({
///     "Database": {"host": "localhost", "pool": {"size": 4}}
/// })).into_map().unwrap();
///
/// let store = ConfigurationStore::builder()
///     .with_bootstrap(bootstrap)
///     .skip_env()
///     .skip_files()
///     .build()
///     .unwrap();
///
/// store.set_value("Database", "pool.size", ConfigValue::from(8)).unwrap();
/// assert_eq!(store.get_value("Database", ["pool", "size"]), Some(ConfigValue::from(8)));
/// ```
#[derive(Default)]
pub struct ConfigurationStore {
    scopes: RwLock<BTreeMap<String, Scope>>,
}

impl ConfigurationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a store from a bootstrap source.
    #[must_use]
    pub fn builder() -> ConfigurationStoreBuilder {
        ConfigurationStoreBuilder::new()
    }

    /// Returns the scope registered under `name`.
    #[must_use]
    pub fn scope(&self, name: &str) -> Option<Scope> {
        self.scopes.read().get(name).cloned()
    }

    /// Returns the scope registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns a missing-configuration error if there is none.
    pub fn require(&self, name: &str) -> Result<Scope> {
        self.scope(name).ok_or_else(|| {
            Error::configuration(
                ConfigErrorKind::Missing,
                format!("no configuration scope named '{name}'"),
            )
        })
    }

    /// Descends from the scope `name` through every segment of `path`.
    ///
    /// Unlike [`PropertyPathResolver::resolve`], the final segment is also
    /// descended into.
    #[must_use]
    pub fn scope_at(&self, name: &str, path: impl Into<PropertyPath>) -> Option<Scope> {
        let path = path.into();
        path.segments()
            .iter()
            .try_fold(self.scope(name)?, |scope, segment| scope.subset(segment))
    }

    /// Names of every registered scope.
    #[must_use]
    pub fn scope_names(&self) -> Vec<String> {
        self.scopes.read().keys().cloned().collect()
    }

    /// Returns true if a scope named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.scopes.read().contains_key(name)
    }

    /// Reads the value at `path` in scope `name`.
    ///
    /// The empty path yields the whole tree of the scope.
    #[must_use]
    pub fn get_value(&self, name: &str, path: impl Into<PropertyPath>) -> Option<ConfigValue> {
        let scope = self.scope(name)?;
        PropertyPathResolver::get_value(&scope, &path.into())
    }

    /// Writes `value` at `path` in scope `name`.
    ///
    /// The path may be dotted (`"a.b.c"`) or segmented (`["a", "b", "c"]`).
    ///
    /// # Errors
    ///
    /// Returns a missing-configuration error if the scope or an
    /// intermediate segment does not exist, or a read-only error if the
    /// owning scope does not accept writes.
    pub fn set_value(
        &self,
        name: &str,
        path: impl Into<PropertyPath>,
        value: ConfigValue,
    ) -> Result<()> {
        let scope = self.require(name)?;
        PropertyPathResolver::set_value(&scope, &path.into(), value)
    }

    /// Registers `scope` under `name`, returning the scope it replaced.
    pub fn insert(&self, name: impl Into<String>, scope: impl Into<Scope>) -> Option<Scope> {
        self.scopes.write().insert(name.into(), scope.into())
    }

    /// Removes the scope registered under `name`.
    pub fn remove(&self, name: &str) -> Option<Scope> {
        self.scopes.write().remove(name)
    }

    /// Applies one update entry to scope `name`.
    ///
    /// - `null` removes the scope.
    /// - A list applies each of its entries in order.
    /// - A map with `property` and `value` keys writes one property;
    ///   `property` is a dotted string or a list of segments.
    /// - Any other map is an overlay: it becomes the scope, or the primary
    ///   of a composite over the existing scope.
    ///
    /// # Errors
    ///
    /// Returns a missing-configuration error for a property write to an
    /// unknown scope, a read-only error for a write to an immutable scope,
    /// or an invalid-configuration error for a malformed entry.
    pub fn apply(&self, name: &str, update: ConfigValue) -> Result<()> {
        self.apply_from(name, update, Access::ReadWrite, None)
    }

    fn apply_from(
        &self,
        name: &str,
        update: ConfigValue,
        access: Access,
        manager: Option<&Arc<dyn ConfigurationManager>>,
    ) -> Result<()> {
        match update {
            ConfigValue::Null => {
                debug!("removing configuration scope '{name}'");
                self.remove(name);
                Ok(())
            }
            ConfigValue::List(entries) => entries
                .into_iter()
                .try_for_each(|entry| self.apply_from(name, entry, access, manager)),
            ConfigValue::Map(mut map) => {
                if map.contains_key(PROPERTY_KEY) && map.contains_key(VALUE_KEY) {
                    let value = map.remove(VALUE_KEY).unwrap_or_default();
                    let path = map
                        .get(PROPERTY_KEY)
                        .and_then(PropertyPath::from_value)
                        .ok_or_else(|| {
                            Error::configuration(
                                ConfigErrorKind::Invalid,
                                format!("update for '{name}' has a malformed property path"),
                            )
                        })?;
                    return self.set_value(name, path, value);
                }

                let overlay: Scope =
                    MapScope::with_options(name, map, access, manager.cloned()).into();
                let mut scopes = self.scopes.write();
                let merged = match scopes.remove(name) {
                    Some(existing) => CompositeScope::new(overlay, existing).into(),
                    None => overlay,
                };
                scopes.insert(name.to_string(), merged);
                Ok(())
            }
            other => Err(Error::configuration(
                ConfigErrorKind::Invalid,
                format!(
                    "update for '{name}' must be a map, a list or null, found {}",
                    other.type_name()
                ),
            )),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, Scope> {
        self.scopes.read().clone()
    }
}

enum BootstrapSource {
    Discover,
    File(PathBuf),
    Map(ConfigMap),
}

struct ManagerEntry {
    manager: Arc<dyn ConfigurationManager>,
    access: Access,
}

/// Builder for [`ConfigurationStore`].
pub struct ConfigurationStoreBuilder {
    bootstrap: BootstrapSource,
    bootstrap_access: Access,
    managers: Vec<ManagerEntry>,
    location_plugins: Vec<Box<dyn FileLocationPlugin>>,
    handlers: Vec<Box<dyn KeywordHandler>>,
    skip_env: bool,
    skip_files: bool,
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("scopes", &self.scope_names())
            .finish_non_exhaustive()
    }
}

impl Default for ConfigurationStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationStoreBuilder {
    /// Creates a builder that discovers the bootstrap file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bootstrap: BootstrapSource::Discover,
            bootstrap_access: Access::ReadWrite,
            managers: Vec::new(),
            location_plugins: Vec::new(),
            handlers: Vec::new(),
            skip_env: false,
            skip_files: false,
        }
    }

    /// Reads the bootstrap configuration from `path`.
    #[must_use]
    pub fn with_bootstrap_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap = BootstrapSource::File(path.into());
        self
    }

    /// Uses an in-memory bootstrap configuration.
    #[must_use]
    pub fn with_bootstrap(mut self, map: ConfigMap) -> Self {
        self.bootstrap = BootstrapSource::Map(map);
        self
    }

    /// Makes the bootstrap scopes read-only.
    #[must_use]
    pub fn bootstrap_read_only(mut self) -> Self {
        self.bootstrap_access = Access::ReadOnly;
        self
    }

    /// Adds a manager whose overlays accept writes.
    #[must_use]
    pub fn with_manager(mut self, manager: Arc<dyn ConfigurationManager>) -> Self {
        self.managers.push(ManagerEntry {
            manager,
            access: Access::ReadWrite,
        });
        self
    }

    /// Adds a manager whose overlays reject writes.
    #[must_use]
    pub fn with_read_only_manager(mut self, manager: Arc<dyn ConfigurationManager>) -> Self {
        self.managers.push(ManagerEntry {
            manager,
            access: Access::ReadOnly,
        });
        self
    }

    /// Adds a file-location plugin to the file manager.
    #[must_use]
    pub fn with_location_plugin(mut self, plugin: Box<dyn FileLocationPlugin>) -> Self {
        self.location_plugins.push(plugin);
        self
    }

    /// Adds a placeholder keyword handler.
    #[must_use]
    pub fn with_keyword_handler(mut self, handler: Box<dyn KeywordHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Ignores the environment and the home directory: no bootstrap path
    /// variable, no `SVCBOOT_CONFIG_LOCATION`, no user file, and no `ENV`
    /// placeholders.
    #[must_use]
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips the built-in file-location plugins. Plugins added with
    /// [`Self::with_location_plugin`] still apply.
    #[must_use]
    pub fn skip_files(mut self) -> Self {
        self.skip_files = true;
        self
    }

    /// Assembles the store.
    ///
    /// # Errors
    ///
    /// Returns a missing-configuration error if no bootstrap file is found,
    /// an internal error if the bootstrap source is malformed, or any error
    /// raised while applying a manager's updates.
    pub fn build(self) -> Result<ConfigurationStore> {
        let bootstrap = self.load_bootstrap()?;

        let staging = ConfigurationStore::new();
        for (name, value) in bootstrap {
            let ConfigValue::Map(map) = value else {
                return Err(Error::Internal {
                    message: format!(
                        "bootstrap entry '{name}' must be a map, found {}",
                        value.type_name()
                    ),
                });
            };
            staging.insert(
                name.clone(),
                MapScope::with_options(name, map, self.bootstrap_access, None),
            );
        }

        let settings = staging.scope(CONFIGURATION_SERVICE_SCOPE);
        let Self {
            managers,
            location_plugins,
            handlers,
            skip_env,
            skip_files,
            ..
        } = self;

        let mut file_manager = FileConfigurationManager::new();
        if !skip_files {
            file_manager = file_manager.with_plugin(Box::new(SettingFileLocation));
            if !skip_env {
                file_manager = file_manager
                    .with_plugin(Box::new(EnvironmentFileLocation))
                    .with_plugin(Box::new(UserFileLocation::default()));
            }
        }
        for plugin in location_plugins {
            file_manager = file_manager.with_plugin(plugin);
        }

        let mut entries = Vec::with_capacity(managers.len() + 1);
        if !file_manager.is_empty() {
            entries.push(ManagerEntry {
                manager: Arc::new(file_manager),
                access: Access::ReadWrite,
            });
        }
        entries.extend(managers);

        for entry in order_managers(entries, settings.as_ref()) {
            let name = entry.manager.name();
            let updates = match entry.manager.load(settings.as_ref()) {
                Ok(Some(updates)) => updates,
                Ok(None) => {
                    debug!("configuration manager '{name}' supplied nothing");
                    continue;
                }
                Err(e) => {
                    warn!("skipping configuration manager '{name}': {e}");
                    continue;
                }
            };
            debug!("applying {} update(s) from manager '{name}'", updates.len());
            for (scope, update) in updates {
                staging.apply_from(&scope, update, entry.access, Some(&entry.manager))?;
            }
        }

        let mut expander = PlaceholderExpander::new();
        for handler in handlers {
            expander = expander.with_handler(handler);
        }
        if !skip_env {
            expander = expander.with_handler(Box::new(EnvKeywordHandler));
        }

        Ok(ConfigurationStore {
            scopes: RwLock::new(expand_scopes(&staging.snapshot(), &expander)),
        })
    }

    fn load_bootstrap(&self) -> Result<ConfigMap> {
        let path = match &self.bootstrap {
            BootstrapSource::Map(map) => return Ok(map.clone()),
            BootstrapSource::File(path) => path.clone(),
            BootstrapSource::Discover => self.discover_bootstrap(),
        };

        if !path.exists() {
            return Err(Error::configuration(
                ConfigErrorKind::Missing,
                format!("bootstrap configuration {} not found", path.display()),
            ));
        }

        ConfigLoader::load_file(&path).map_err(|e| Error::Internal {
            message: format!("malformed bootstrap configuration: {e}"),
        })
    }

    fn discover_bootstrap(&self) -> PathBuf {
        if !self.skip_env {
            if let Some(path) = env::var_os(BOOTSTRAP_PATH_ENV) {
                return PathBuf::from(path);
            }
        }
        Path::new(DEFAULT_BOOTSTRAP_FILE).to_path_buf()
    }
}

/// Orders managers by the `manager-sequence` setting. Unlisted managers
/// keep their registration order after the listed ones.
fn order_managers(entries: Vec<ManagerEntry>, settings: Option<&Scope>) -> Vec<ManagerEntry> {
    let sequence: Vec<String> = settings
        .and_then(|s| s.get(MANAGER_SEQUENCE_SETTING))
        .and_then(|value| value.as_list().cloned())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if sequence.is_empty() {
        return entries;
    }

    let (mut listed, unlisted): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| sequence.iter().any(|name| name == entry.manager.name()));
    listed.sort_by_key(|entry| {
        sequence
            .iter()
            .position(|name| name == entry.manager.name())
            .unwrap_or(usize::MAX)
    });
    listed.extend(unlisted);
    listed
}

fn expand_scopes(
    scopes: &BTreeMap<String, Scope>,
    expander: &PlaceholderExpander,
) -> BTreeMap<String, Scope> {
    let lookup = |name: &str| scopes.get(name).cloned();
    let mut derived: HashMap<usize, MapScope> = HashMap::new();
    let mut remap = |member: &MapScope| {
        let root = derived
            .entry(member.root_key())
            .or_insert_with(|| member.derive_root(|data| expander.expand_map(data, &lookup)));
        member.rebased(root)
    };

    scopes
        .iter()
        .map(|(name, scope)| (name.clone(), scope.map_members(&mut remap)))
        .collect()
}
