//! Declarative service bootstrap.
//!
//! Services are declared in the `ServiceManager` configuration scope, each
//! naming a registered implementation, its dependencies, its singleton
//! policy and its configuration. [`LifecycleOrchestrator::initialize`]
//! turns that catalog into running services:
//!
//! 1. [`ServiceCatalogBuilder`] reads every enabled definition
//! 2. [`DependencyGraphResolver`] orders them so dependencies come first
//! 3. each service is instantiated, configured and initialized
//! 4. [`SingletonRegistry`] arbitrates CLASS, NAME and VERSION keys
//!
//! Teardown runs in reverse registration order.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use svcboot::config::{ConfigValue, ConfigurationStore};
//! use svcboot::service::{
//!     Capabilities, ImplementationRegistry, LifecycleOrchestrator, Service, ServiceContext,
//! };
//!
//! #[derive(Default)]
//! struct Database;
//! impl Service for Database {}
//!
//! #[derive(Default)]
//! struct Api;
//! impl Service for Api {
//!     fn initialize(&self, context: &ServiceContext<'_>) -> anyhow::Result<()> {
//!         anyhow::ensure!(context.get::<Database>().is_some(), "database not running");
//!         Ok(())
//!     }
//! }
//!
//! let bootstrap = ConfigValue::from(serde_json::json!({
//!     "ServiceManager": {"services": {
//!         "api": {"className": "api", "dependencies": ["db"]},
//!         "db": {"className": "database"}
//!     }}
//! })).into_map().unwrap();
//! let store = ConfigurationStore::builder()
//!     .with_bootstrap(bootstrap)
//!     .skip_env()
//!     .skip_files()
//!     .build()
//!     .unwrap();
//!
//! let implementations = ImplementationRegistry::new()
//!     .with("api", Capabilities::MANAGED, Api::default)
//!     .with("database", Capabilities::MANAGED, Database::default);
//!
//! let orchestrator = LifecycleOrchestrator::new(Arc::new(store), implementations);
//! orchestrator.initialize().unwrap();
//!
//! let ids: Vec<_> = orchestrator.services().iter().map(|s| s.id().to_string()).collect();
//! assert_eq!(ids, ["db", "api"]);
//! orchestrator.destroy();
//! ```

pub mod catalog;
pub mod definition;
pub mod factory;
pub mod graph;
pub mod implementation;
pub mod orchestrator;
pub mod registry;

#[cfg(all(test, feature = "property-tests"))]
mod proptests;

// Re-export key types at module root
pub use catalog::{
    ServiceCatalog, ServiceCatalogBuilder, SERVICES_KEY, SERVICE_MANAGER_SCOPE,
    SERVICE_SEQUENCE_KEY,
};
pub use definition::{
    ConflictAction, ServiceDefinition, ServiceDetail, SingletonPolicy, SingletonScope,
};
pub use factory::{Feature, FeatureRegistry, ServiceFactory};
pub use graph::{DependencyCycle, DependencyGraph, DependencyGraphResolver, DependencyNode};
pub use implementation::{AsAny, Capabilities, Implementation, ImplementationRegistry, Service};
pub use orchestrator::{LifecycleOrchestrator, ServiceContext};
pub use registry::{Claim, Registration, ServiceHandle, ServiceState, SingletonRegistry};
