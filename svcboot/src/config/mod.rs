//! Layered configuration for services.
//!
//! Configuration is organized in named scopes. Each scope is a tree of
//! [`ConfigValue`]s that can be read and written by dotted or segmented
//! property paths.
//!
//! # Layering
//!
//! A store is assembled from, in increasing precedence:
//!
//! 1. The bootstrap source (`config-service-config.json`, the file named by
//!    `SVCBOOT_BOOTSTRAP_PATH`, or an in-memory map)
//! 2. Files found by the file-location plugins (`config-location` setting,
//!    `SVCBOOT_CONFIG_LOCATION`, `~/.svcboot/config.yaml`)
//! 3. Each registered [`ConfigurationManager`], in `manager-sequence` order
//!
//! A later layer that overlays an existing scope becomes the primary of a
//! [`CompositeScope`] over it. Once every layer is applied, `{$CONFIGREF$}`
//! and `{$ENV$}` placeholders are expanded in one pass.
//!
//! # Examples
//!
//! ```
//! use svcboot::config::{ConfigValue, ConfigurationStore, StaticConfigurationManager};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let bootstrap = ConfigValue::from(json!({
//!     "Cache": {"size": 10, "backend": "{$CONFIGREF:Backends','memory$}"},
//!     "Backends": {"memory": {"kind": "lru"}}
//! })).into_map().unwrap();
//!
//! let overrides = ConfigValue::from(json!({"Cache": {"size": 64}})).into_map().unwrap();
//!
//! let store = ConfigurationStore::builder()
//!     .with_bootstrap(bootstrap)
//!     .with_manager(Arc::new(StaticConfigurationManager::new("overrides", overrides)))
//!     .skip_env()
//!     .skip_files()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(store.get_value("Cache", "size"), Some(ConfigValue::from(64)));
//! assert_eq!(store.get_value("Cache", "backend.kind"), Some(ConfigValue::from("lru")));
//! ```

pub mod loader;
pub mod merger;
pub mod path;
pub mod placeholder;
pub mod scope;
pub mod sources;
pub mod store;
pub mod value;

#[cfg(all(test, feature = "property-tests"))]
mod proptests;

// Re-export key types at module root
pub use loader::{ConfigLoader, SourceFormat};
pub use merger::ConfigMerger;
pub use path::{PropertyPath, PropertyPathResolver, Resolution};
pub use placeholder::{
    parse_config_ref, EnvKeywordHandler, KeywordHandler, PlaceholderExpander, ARGUMENT_SEPARATOR,
    PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN,
};
pub use scope::{Access, CompositeScope, MapScope, PendingUpdate, Scope};
pub use sources::{
    ConfigurationManager, EnvironmentFileLocation, FileConfigurationManager, FileLocationPlugin,
    FileStoreManager, ManagerFeature, SettingFileLocation, StaticConfigurationManager,
    UserFileLocation, CONFIG_LOCATION_ENV, CONFIG_LOCATION_SETTING,
};
pub use store::{
    ConfigurationStore, ConfigurationStoreBuilder, BOOTSTRAP_PATH_ENV,
    CONFIGURATION_SERVICE_SCOPE, DEFAULT_BOOTSTRAP_FILE, MANAGER_SEQUENCE_SETTING,
};
pub use value::{ConfigMap, ConfigValue};
