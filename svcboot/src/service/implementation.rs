//! Service implementations and the registry that constructs them.
//!
//! Implementations are registered under a string key (the `className` of a
//! catalog entry) together with a constructor and the [`Capabilities`] they
//! take part in. The orchestrator instantiates services only through this
//! registry.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Scope;
use crate::service::factory::ServiceFactory;
use crate::service::orchestrator::ServiceContext;

/// Type information for service instances.
///
/// Implemented for every `'static + Send + Sync` type. Call these through a
/// `&dyn Service` (not an `Arc`) to get the concrete service's answer.
pub trait AsAny: Any + Send + Sync {
    /// Converts a shared instance into a shared `Any` for downcasting.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// The concrete type's id.
    fn service_type_id(&self) -> TypeId;

    /// The concrete type's name.
    fn service_type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn service_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn service_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A managed service.
///
/// Every hook has a no-op default. Which hooks run is decided by the
/// [`Capabilities`] declared at registration, not by the presence of an
/// override.
///
/// # Examples
///
/// ```
/// use svcboot::config::Scope;
/// use svcboot::service::Service;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct Greeter {
///     greeting: Mutex<String>,
/// }
///
/// impl Service for Greeter {
///     fn configure(&self, configuration: &Scope) -> anyhow::Result<()> {
///         if let Some(greeting) = configuration.get("greeting") {
///             *self.greeting.lock().unwrap() = greeting.as_str().unwrap_or_default().to_string();
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Service: AsAny {
    /// Applies the service's effective configuration.
    ///
    /// # Errors
    ///
    /// Any error aborts the service's startup.
    fn configure(&self, _configuration: &Scope) -> anyhow::Result<()> {
        Ok(())
    }

    /// Starts the service.
    ///
    /// # Errors
    ///
    /// Any error aborts the service's startup.
    fn initialize(&self, _context: &ServiceContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases the service's resources.
    ///
    /// # Errors
    ///
    /// Errors are logged by the orchestrator and never propagated.
    fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Returns the factory face of this service, if it is one.
    fn as_factory(&self) -> Option<&dyn ServiceFactory> {
        None
    }
}

/// Hooks a service takes part in, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
    /// Receives its configuration through [`Service::configure`].
    pub configurable: bool,
    /// Is started and stopped through [`Service::initialize`] and
    /// [`Service::destroy`].
    pub lifecycle: bool,
    /// Exposes [`Service::as_factory`] and registers its features.
    pub factory: bool,
}

impl Capabilities {
    /// No hooks at all.
    pub const NONE: Self = Self {
        configurable: false,
        lifecycle: false,
        factory: false,
    };

    /// Configure and lifecycle hooks.
    pub const MANAGED: Self = Self {
        configurable: true,
        lifecycle: true,
        factory: false,
    };

    /// Adds the configure hook.
    #[must_use]
    pub const fn configurable(mut self) -> Self {
        self.configurable = true;
        self
    }

    /// Adds the lifecycle hooks.
    #[must_use]
    pub const fn lifecycle(mut self) -> Self {
        self.lifecycle = true;
        self
    }

    /// Marks the service as a factory.
    #[must_use]
    pub const fn factory(mut self) -> Self {
        self.factory = true;
        self
    }

    /// Capabilities assumed for a pre-built instance: managed, plus factory
    /// if it exposes one.
    #[must_use]
    pub fn detect(instance: &dyn Service) -> Self {
        let detected = Self::MANAGED;
        if instance.as_factory().is_some() {
            detected.factory()
        } else {
            detected
        }
    }
}

type Constructor = Box<dyn Fn() -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;

/// A registered implementation: how to build it and which hooks it has.
pub struct Implementation {
    key: String,
    type_id: TypeId,
    type_name: &'static str,
    capabilities: Capabilities,
    constructor: Constructor,
}

impl Implementation {
    /// The key the implementation is registered under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Id of the type the constructor produces.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the type the constructor produces.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns true if `instance` is of this implementation's type.
    #[must_use]
    pub fn accepts(&self, instance: &dyn Service) -> bool {
        instance.service_type_id() == self.type_id
    }

    /// Builds a new instance.
    ///
    /// # Errors
    ///
    /// Returns whatever the constructor reports.
    pub fn instantiate(&self) -> anyhow::Result<Arc<dyn Service>> {
        (self.constructor)()
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Maps implementation keys to constructors.
///
/// # Examples
///
/// ```
/// use svcboot::service::{Capabilities, ImplementationRegistry, Service};
///
/// #[derive(Default)]
/// struct Metrics;
/// impl Service for Metrics {}
///
/// let mut registry = ImplementationRegistry::new();
/// registry.register("metrics", Capabilities::MANAGED, Metrics::default);
///
/// let implementation = registry.get("metrics").unwrap();
/// assert!(implementation.capabilities().lifecycle);
/// assert!(implementation.instantiate().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct ImplementationRegistry {
    implementations: BTreeMap<String, Implementation>,
}

impl ImplementationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an infallible constructor under `key`, replacing any
    /// earlier registration.
    pub fn register<T, F>(
        &mut self,
        key: impl Into<String>,
        capabilities: Capabilities,
        constructor: F,
    ) -> &mut Self
    where
        T: Service,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_fallible(key, capabilities, move || Ok(constructor()))
    }

    /// Registers a constructor that may fail.
    pub fn register_fallible<T, F>(
        &mut self,
        key: impl Into<String>,
        capabilities: Capabilities,
        constructor: F,
    ) -> &mut Self
    where
        T: Service,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let key = key.into();
        let implementation = Implementation {
            key: key.clone(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            capabilities,
            constructor: Box::new(move || {
                let instance: Arc<dyn Service> = Arc::new(constructor()?);
                Ok(instance)
            }),
        };
        self.implementations.insert(key, implementation);
        self
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with<T, F>(
        mut self,
        key: impl Into<String>,
        capabilities: Capabilities,
        constructor: F,
    ) -> Self
    where
        T: Service,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(key, capabilities, constructor);
        self
    }

    /// Looks up an implementation.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Implementation> {
        self.implementations.get(key)
    }

    /// Returns true if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.implementations.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.implementations.keys().map(String::as_str)
    }

    /// Number of registered implementations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.implementations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Plain;
    impl Service for Plain {}

    #[derive(Default)]
    struct Other;
    impl Service for Other {}

    #[test]
    fn test_register_and_instantiate() {
        let registry =
            ImplementationRegistry::new().with("plain", Capabilities::NONE, Plain::default);
        assert!(registry.contains("plain"));
        assert_eq!(registry.len(), 1);

        let implementation = registry.get("plain").unwrap();
        let instance = implementation.instantiate().unwrap();
        assert!(implementation.accepts(instance.as_ref()));
        assert!(implementation.type_name().ends_with("Plain"));
    }

    #[test]
    fn test_accepts_checks_concrete_type() {
        let registry =
            ImplementationRegistry::new().with("plain", Capabilities::NONE, Plain::default);
        let other: Arc<dyn Service> = Arc::new(Other);
        assert!(!registry.get("plain").unwrap().accepts(other.as_ref()));
    }

    #[test]
    fn test_fallible_constructor() {
        let mut registry = ImplementationRegistry::new();
        registry.register_fallible("broken", Capabilities::NONE, || -> anyhow::Result<Plain> {
            Err(anyhow::anyhow!("no backend"))
        });
        let err = registry.get("broken").unwrap().instantiate().err().unwrap();
        assert_eq!(err.to_string(), "no backend");
    }

    #[test]
    fn test_type_info_through_trait_object() {
        let instance: Arc<dyn Service> = Arc::new(Plain);
        assert_eq!(instance.as_ref().service_type_id(), TypeId::of::<Plain>());
        assert!(instance.as_ref().service_type_name().ends_with("Plain"));
        assert!(Arc::clone(&instance).into_any_arc().downcast::<Plain>().is_ok());
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(
            Capabilities::NONE.configurable().lifecycle(),
            Capabilities::MANAGED
        );
        assert!(Capabilities::NONE.factory().factory);
        assert_eq!(Capabilities::detect(&Plain), Capabilities::MANAGED);
    }
}
