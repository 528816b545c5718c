#![deny(missing_docs, unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # svcboot
//!
//! Layered configuration and dependency-ordered service bootstrap.
//!
//! This library assembles named configuration scopes from a bootstrap file,
//! file and plugin overlays, and placeholder expansion, then brings up the
//! services declared in that configuration in dependency order.
//!
//! ## Core Types
//!
//! - [`ConfigurationStore`] and [`Scope`]: Named, layered configuration trees
//! - [`PropertyPath`] and [`PropertyPathResolver`]: Dotted/segmented addressing
//! - [`PlaceholderExpander`]: `{$CONFIGREF$}` and keyword substitution
//! - [`LifecycleOrchestrator`]: Configure, initialize and destroy services
//! - [`ServiceDefinition`] and [`SingletonPolicy`]: What to start and how
//! - [`Error`] and [`Result`]: Error handling types
//! - [`Logger`] and [`LogLevel`]: Logging infrastructure
//!
//! ## Examples
//!
//! ```
//! use svcboot::{ConfigValue, ConfigurationStore};
//!
//! let bootstrap = ConfigValue::from(serde_json::json!({
//!     "Http": {"port": 8080, "tls": {"enabled": false}}
//! })).into_map().unwrap();
//!
//! let store = ConfigurationStore::builder()
//!     .with_bootstrap(bootstrap)
//!     .skip_env()
//!     .skip_files()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(store.get_value("Http", "tls.enabled"), Some(ConfigValue::from(false)));
//! assert_eq!(store.get_value("Http", ["port"]), Some(ConfigValue::from(8080)));
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod service;

// Re-export key types at crate root for convenience
pub use config::{
    CompositeScope, ConfigMap, ConfigValue, ConfigurationManager, ConfigurationStore,
    ConfigurationStoreBuilder, KeywordHandler, MapScope, PlaceholderExpander, PropertyPath,
    PropertyPathResolver, Scope,
};
pub use error::{ConfigErrorKind, Error, Result, ValidationCode, ValidationError};
pub use logging::{init_logger, LogLevel, Logger};
pub use service::{
    Capabilities, ConflictAction, ImplementationRegistry, LifecycleOrchestrator, Service,
    ServiceContext, ServiceDefinition, ServiceDetail, ServiceHandle, SingletonPolicy,
    SingletonScope,
};
