//! Configuration managers and file-location plugins.
//!
//! A [`ConfigurationManager`] contributes updates on top of the bootstrap
//! configuration and may persist scopes it backs. The updates it returns
//! are keyed by scope name; see [`crate::config::ConfigurationStore`] for
//! how each entry is applied.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::loader::ConfigLoader;
use crate::config::merger::ConfigMerger;
use crate::config::scope::{PendingUpdate, Scope};
use crate::config::value::{ConfigMap, ConfigValue};
use crate::error::{ConfigErrorKind, Error, Result};

/// Setting naming extra configuration files, read from the
/// `ConfigurationService` scope.
pub const CONFIG_LOCATION_SETTING: &str = "config-location";

/// Environment variable listing extra configuration files.
pub const CONFIG_LOCATION_ENV: &str = "SVCBOOT_CONFIG_LOCATION";

/// Persistence operations a manager may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerFeature {
    /// Accepts the full tree of a scope.
    Save,
    /// Accepts the list of pending updates of a scope.
    Update,
}

impl fmt::Display for ManagerFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save => write!(f, "save"),
            Self::Update => write!(f, "update"),
        }
    }
}

fn unsupported(manager: &str, feature: ManagerFeature) -> Error {
    Error::configuration(
        ConfigErrorKind::Unsupported,
        format!("manager '{manager}' does not support {feature}"),
    )
}

/// A source of configuration updates.
pub trait ConfigurationManager: Send + Sync {
    /// Name used in logs and in the `manager-sequence` setting.
    fn name(&self) -> &str;

    /// Produces updates keyed by scope name, or `None` for nothing.
    ///
    /// `settings` is the `ConfigurationService` scope, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read. Such managers are
    /// skipped during bootstrap.
    fn load(&self, settings: Option<&Scope>) -> Result<Option<ConfigMap>>;

    /// Returns true if the manager supports `feature`.
    fn supports(&self, feature: ManagerFeature) -> bool {
        let _ = feature;
        false
    }

    /// Persists the full tree of `scope`.
    ///
    /// # Errors
    ///
    /// Unsupported unless overridden.
    fn save(&self, scope: &str, configuration: &ConfigMap) -> Result<()> {
        let _ = (scope, configuration);
        Err(unsupported(self.name(), ManagerFeature::Save))
    }

    /// Persists pending updates of `scope`.
    ///
    /// # Errors
    ///
    /// Unsupported unless overridden.
    fn update(&self, scope: &str, updates: &[PendingUpdate]) -> Result<()> {
        let _ = (scope, updates);
        Err(unsupported(self.name(), ManagerFeature::Update))
    }
}

/// Supplies configuration file locations.
pub trait FileLocationPlugin: Send + Sync {
    /// Ordered locations to read. Later files take precedence.
    fn locations(&self, settings: Option<&Scope>) -> Vec<PathBuf>;
}

/// Locations from the `config-location` setting: one path or a list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettingFileLocation;

impl FileLocationPlugin for SettingFileLocation {
    fn locations(&self, settings: Option<&Scope>) -> Vec<PathBuf> {
        match settings.and_then(|s| s.get(CONFIG_LOCATION_SETTING)) {
            Some(ConfigValue::String(path)) => vec![PathBuf::from(path)],
            Some(ConfigValue::List(items)) => items
                .iter()
                .filter_map(ConfigValue::as_str)
                .map(PathBuf::from)
                .collect(),
            Some(other) => {
                warn!(
                    "ignoring '{CONFIG_LOCATION_SETTING}' of type {}",
                    other.type_name()
                );
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

/// Locations from `SVCBOOT_CONFIG_LOCATION`, split like `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentFileLocation;

impl FileLocationPlugin for EnvironmentFileLocation {
    fn locations(&self, _settings: Option<&Scope>) -> Vec<PathBuf> {
        env::var_os(CONFIG_LOCATION_ENV)
            .map(|value| env::split_paths(&value).collect())
            .unwrap_or_default()
    }
}

/// The per-user file `~/.svcboot/config.yaml`.
#[derive(Debug, Default, Clone)]
pub struct UserFileLocation {
    dir: Option<PathBuf>,
}

impl UserFileLocation {
    /// Uses `dir` in place of `~/.svcboot`.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl FileLocationPlugin for UserFileLocation {
    fn locations(&self, _settings: Option<&Scope>) -> Vec<PathBuf> {
        self.dir
            .clone()
            .or_else(|| home::home_dir().map(|home| home.join(".svcboot")))
            .map(|dir| vec![dir.join("config.yaml")])
            .unwrap_or_default()
    }
}

/// Read-only manager merging the files named by its location plugins.
///
/// Files are merged left to right, later files deep-merging into earlier
/// ones. Missing or unreadable files are skipped.
pub struct FileConfigurationManager {
    plugins: Vec<Box<dyn FileLocationPlugin>>,
}

impl FileConfigurationManager {
    /// Creates a manager with no location plugins.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Appends a location plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: Box<dyn FileLocationPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Returns true if no location plugin is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for FileConfigurationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationManager for FileConfigurationManager {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self, settings: Option<&Scope>) -> Result<Option<ConfigMap>> {
        let mut sources = Vec::new();
        for path in self.plugins.iter().flat_map(|p| p.locations(settings)) {
            if !path.exists() {
                debug!("configuration file {} not found, skipping", path.display());
                continue;
            }
            match ConfigLoader::load_file(&path) {
                Ok(map) => sources.push(map),
                Err(e) => warn!("skipping configuration file: {e}"),
            }
        }

        if sources.is_empty() {
            return Ok(None);
        }
        Ok(Some(ConfigMerger::merge(sources)))
    }
}

type SaveHook = Box<dyn Fn(&str, &ConfigMap) -> Result<()> + Send + Sync>;
type UpdateHook = Box<dyn Fn(&str, &[PendingUpdate]) -> Result<()> + Send + Sync>;

/// In-memory manager supplying a fixed set of updates.
///
/// Persistence is available when a hook is installed.
///
/// # Examples
///
/// ```
/// use svcboot::config::{ConfigValue, ConfigurationManager, ManagerFeature, StaticConfigurationManager};
/// use serde_json::json;
///
/// let updates = ConfigValue::from(json!({"App": {"debug": true}})).into_map().unwrap();
/// let manager = StaticConfigurationManager::new("overrides", updates)
///     .with_save_hook(|_scope, _tree| Ok(()));
///
/// assert!(manager.supports(ManagerFeature::Save));
/// assert!(!manager.supports(ManagerFeature::Update));
/// ```
pub struct StaticConfigurationManager {
    name: String,
    updates: ConfigMap,
    on_save: Option<SaveHook>,
    on_update: Option<UpdateHook>,
}

impl StaticConfigurationManager {
    /// Creates a manager returning `updates` from every load.
    #[must_use]
    pub fn new(name: impl Into<String>, updates: ConfigMap) -> Self {
        Self {
            name: name.into(),
            updates,
            on_save: None,
            on_update: None,
        }
    }

    /// Enables [`ManagerFeature::Save`], forwarding saves to `hook`.
    #[must_use]
    pub fn with_save_hook(
        mut self,
        hook: impl Fn(&str, &ConfigMap) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_save = Some(Box::new(hook));
        self
    }

    /// Enables [`ManagerFeature::Update`], forwarding updates to `hook`.
    #[must_use]
    pub fn with_update_hook(
        mut self,
        hook: impl Fn(&str, &[PendingUpdate]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(hook));
        self
    }
}

impl ConfigurationManager for StaticConfigurationManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, _settings: Option<&Scope>) -> Result<Option<ConfigMap>> {
        Ok(Some(self.updates.clone()))
    }

    fn supports(&self, feature: ManagerFeature) -> bool {
        match feature {
            ManagerFeature::Save => self.on_save.is_some(),
            ManagerFeature::Update => self.on_update.is_some(),
        }
    }

    fn save(&self, scope: &str, configuration: &ConfigMap) -> Result<()> {
        match &self.on_save {
            Some(hook) => hook(scope, configuration),
            None => Err(unsupported(&self.name, ManagerFeature::Save)),
        }
    }

    fn update(&self, scope: &str, updates: &[PendingUpdate]) -> Result<()> {
        match &self.on_update {
            Some(hook) => hook(scope, updates),
            None => Err(unsupported(&self.name, ManagerFeature::Update)),
        }
    }
}

/// Manager backed by one writable file holding several scopes.
///
/// Saving a scope rewrites that scope's entry in the file.
#[derive(Debug, Clone)]
pub struct FileStoreManager {
    name: String,
    path: PathBuf,
}

impl FileStoreManager {
    /// Creates a manager for the file at `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationManager for FileStoreManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, _settings: Option<&Scope>) -> Result<Option<ConfigMap>> {
        if !self.path.exists() {
            return Ok(None);
        }
        ConfigLoader::load_file(&self.path).map(Some)
    }

    fn supports(&self, feature: ManagerFeature) -> bool {
        feature == ManagerFeature::Save
    }

    fn save(&self, scope: &str, configuration: &ConfigMap) -> Result<()> {
        let mut contents = if self.path.exists() {
            ConfigLoader::load_file(&self.path)?
        } else {
            ConfigMap::new()
        };
        contents.insert(scope.to_string(), ConfigValue::Map(configuration.clone()));
        ConfigLoader::write_file(&self.path, &contents)
    }
}
