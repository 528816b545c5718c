//! Service factories and the features they provide.
//!
//! A factory is a registered service whose [`Service::as_factory`] returns
//! a [`ServiceFactory`]. When it is registered, each of its
//! [`supported_features`](ServiceFactory::supported_features) is mapped to it
//! in the orchestrator's [`FeatureRegistry`].
//!
//! [`Service::as_factory`]: crate::service::Service::as_factory

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use crate::config::Scope;
use crate::service::definition::ServiceDetail;
use crate::service::implementation::Service;
use crate::service::registry::ServiceHandle;

/// A named capability a factory can provide.
///
/// Feature names compare case-insensitively.
///
/// # Examples
///
/// ```
/// use svcboot::service::Feature;
///
/// assert_eq!(Feature::new("Storage"), Feature::new("storage"));
/// assert_eq!(Feature::new("Storage").name(), "Storage");
/// ```
#[derive(Debug, Clone)]
pub struct Feature {
    name: String,
    key: String,
}

impl Feature {
    /// Creates a feature.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = name.to_lowercase();
        Self { name, key }
    }

    /// The feature name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Feature {}

impl Hash for Feature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Feature {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Feature {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Creates instances of one kind of service on demand.
pub trait ServiceFactory: Send + Sync {
    /// Name and version of the services this factory creates.
    fn service_detail(&self) -> ServiceDetail;

    /// Features the created services provide.
    fn supported_features(&self) -> Vec<Feature> {
        Vec::new()
    }

    /// Returns true if the created services are compatible with `version`.
    /// An empty version is never compatible.
    fn is_compatible(&self, version: &str) -> bool;

    /// Creates a new service from `configuration`.
    ///
    /// # Errors
    ///
    /// Returns whatever prevented creation.
    fn create(&self, configuration: Option<&Scope>) -> anyhow::Result<Arc<dyn Service>>;

    /// Releases a service created by this factory. Services the factory
    /// does not recognise are ignored.
    ///
    /// # Errors
    ///
    /// Returns whatever prevented disposal.
    fn dispose(&self, _service: Arc<dyn Service>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Maps features to the factory registered for them.
///
/// Owned by one orchestrator; a later registration for the same feature
/// replaces the earlier one.
#[derive(Default)]
pub struct FeatureRegistry {
    factories: RwLock<BTreeMap<Feature, Arc<ServiceHandle>>>,
}

impl FeatureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `feature` to `factory`, returning the factory it replaced.
    pub fn register(
        &self,
        feature: Feature,
        factory: Arc<ServiceHandle>,
    ) -> Option<Arc<ServiceHandle>> {
        let replaced = self
            .factories
            .write()
            .insert(feature.clone(), Arc::clone(&factory));
        if let Some(old) = &replaced {
            info!(
                "factory '{}' replaces '{}' for feature '{feature}'",
                factory.id(),
                old.id()
            );
        }
        replaced
    }

    /// The factory registered for `feature`.
    #[must_use]
    pub fn get(&self, feature: &Feature) -> Option<Arc<ServiceHandle>> {
        self.factories.read().get(feature).cloned()
    }

    /// Registered features, sorted.
    #[must_use]
    pub fn features(&self) -> Vec<Feature> {
        self.factories.read().keys().cloned().collect()
    }

    /// Number of mapped features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Returns true if no feature is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }

    /// Drops every mapping.
    pub fn clear(&self) {
        self.factories.write().clear();
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.features())
            .finish()
    }
}
