//! Bringing services up and tearing them down.
//!
//! [`LifecycleOrchestrator::initialize`] reads the service catalog, orders
//! it and registers each definition in turn:
//!
//! 1. instantiate through the implementation registry, or accept a
//!    pre-built instance
//! 2. compose the effective configuration
//! 3. configure, then initialize
//! 4. claim singleton keys
//! 5. map factory features
//!
//! The first failure destroys everything already started, newest first,
//! and is returned. [`LifecycleOrchestrator::destroy`] performs the same
//! teardown on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::config::{CompositeScope, ConfigValue, ConfigurationStore, Scope};
use crate::error::{Error, Result, ValidationCode};
use crate::service::catalog::{ServiceCatalogBuilder, SERVICES_KEY};
use crate::service::definition::{ServiceDefinition, ServiceDetail, SingletonPolicy, SingletonScope};
use crate::service::factory::{Feature, FeatureRegistry};
use crate::service::graph::DependencyGraphResolver;
use crate::service::implementation::{AsAny, Capabilities, ImplementationRegistry, Service};
use crate::service::registry::{Claim, Registration, ServiceHandle, ServiceState, SingletonRegistry};

/// What a service sees of its orchestrator while it initializes.
///
/// Lookups only find services registered before the current one.
#[derive(Clone, Copy)]
pub struct ServiceContext<'a> {
    orchestrator: &'a LifecycleOrchestrator,
    service_id: &'a str,
}

impl<'a> ServiceContext<'a> {
    /// Identifier of the service being initialized.
    #[must_use]
    pub fn service_id(&self) -> &'a str {
        self.service_id
    }

    /// The configuration store.
    #[must_use]
    pub fn store(&self) -> &'a ConfigurationStore {
        &self.orchestrator.store
    }

    /// A registered service by identifier.
    #[must_use]
    pub fn service(&self, id: &str) -> Option<Arc<ServiceHandle>> {
        self.orchestrator.service(id)
    }

    /// The service holding the CLASS key `class`.
    #[must_use]
    pub fn by_class(&self, class: &str) -> Option<Arc<ServiceHandle>> {
        self.orchestrator.service_by_class(class)
    }

    /// The service holding the NAME key `name`.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<ServiceHandle>> {
        self.orchestrator.service_by_name(name)
    }

    /// The service holding the (NAME, VERSION) key `detail`.
    #[must_use]
    pub fn by_detail(&self, detail: &ServiceDetail) -> Option<Arc<ServiceHandle>> {
        self.orchestrator.service_by_detail(detail)
    }

    /// The first registered service of type `T`.
    #[must_use]
    pub fn get<T: Service>(&self) -> Option<Arc<T>> {
        self.orchestrator.get::<T>()
    }

    /// The factory registered for `feature`.
    #[must_use]
    pub fn factory_for(&self, feature: &Feature) -> Option<Arc<ServiceHandle>> {
        self.orchestrator.factory_for(feature)
    }
}

/// Drives every service through configure, initialize and destroy.
///
/// Owns the singleton and feature registries of one application; nothing
/// is held in global state.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use svcboot::config::{ConfigValue, ConfigurationStore};
/// use svcboot::service::{Capabilities, ImplementationRegistry, LifecycleOrchestrator, Service};
///
/// #[derive(Default)]
/// struct Clock;
/// impl Service for Clock {}
///
/// let bootstrap = ConfigValue::from(serde_json::json!({
///     "ServiceManager": {"services": {"clock": {"className": "clock"}}}
/// })).into_map().unwrap();
/// let store = ConfigurationStore::builder()
///     .with_bootstrap(bootstrap)
///     .skip_env()
///     .skip_files()
///     .build()
///     .unwrap();
///
/// let implementations = ImplementationRegistry::new().with("clock", Capabilities::MANAGED, Clock::default);
/// let orchestrator = LifecycleOrchestrator::new(Arc::new(store), implementations);
///
/// orchestrator.initialize().unwrap();
/// assert!(orchestrator.get::<Clock>().is_some());
///
/// orchestrator.destroy();
/// assert!(orchestrator.services().is_empty());
/// ```
pub struct LifecycleOrchestrator {
    store: Arc<ConfigurationStore>,
    implementations: ImplementationRegistry,
    singletons: SingletonRegistry,
    features: FeatureRegistry,
    services: RwLock<Vec<Arc<ServiceHandle>>>,
    initialized: AtomicBool,
}

impl LifecycleOrchestrator {
    /// Creates an orchestrator over `store`, instantiating services from
    /// `implementations`.
    #[must_use]
    pub fn new(store: Arc<ConfigurationStore>, implementations: ImplementationRegistry) -> Self {
        Self {
            store,
            implementations,
            singletons: SingletonRegistry::new(),
            features: FeatureRegistry::new(),
            services: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Brings up every enabled service of the catalog in dependency order.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - a missing-configuration error if there is no service catalog
    /// - one validation error holding every catalog and dependency problem
    /// - the first registration failure, after tearing down every service
    ///   started so far
    /// - an internal error if the orchestrator is already initialized
    pub fn initialize(&self) -> Result<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Internal {
                message: "services are already initialized".to_string(),
            });
        }

        let outcome = self.bootstrap();
        if let Err(err) = &outcome {
            warn!("service bootstrap failed: {err}");
            self.destroy();
        }
        outcome
    }

    fn bootstrap(&self) -> Result<()> {
        let mut catalog = ServiceCatalogBuilder::new(&self.store, &self.implementations).build()?;
        let order = DependencyGraphResolver::resolve(&catalog)?;
        debug!("service initialization order: [{}]", order.join(", "));

        for id in &order {
            if let Some(definition) = catalog.take(id) {
                self.register_service(definition)?;
            }
        }

        info!("initialized {} service(s)", self.services.read().len());
        Ok(())
    }

    /// Instantiates, configures and initializes one service, then claims
    /// its singleton keys.
    ///
    /// Returns `None` if an IGNORE policy dropped the service because its
    /// key was already taken; the new instance has then been destroyed.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the definition names neither an
    /// implementation nor an instance, names an unknown implementation, or
    /// pairs an instance with an implementation of another type, or if an
    /// ERROR policy finds its key taken. Returns an initialization error if
    /// construction or a hook fails. A service that fails after being
    /// created is destroyed before the error is returned.
    pub fn register_service(
        &self,
        definition: ServiceDefinition,
    ) -> Result<Option<Arc<ServiceHandle>>> {
        let (instance, implementation, capabilities) = self.instantiate(&definition)?;

        let detail = definition.detail().cloned().or_else(|| {
            if capabilities.factory {
                instance.as_factory().map(|f| f.service_detail())
            } else {
                None
            }
        });

        let handle = Arc::new(ServiceHandle::new(
            definition.id(),
            implementation,
            capabilities,
            detail.clone(),
            instance,
        ));

        let configuration = self.effective_configuration(&definition, detail.as_ref());
        if let Err(source) = self.start(&handle, configuration.as_ref()) {
            self.discard(&handle);
            return Err(Error::initialization(definition.id(), source));
        }

        let claim = Claim {
            class: Some(handle.implementation().to_string()),
            detail,
            policy: definition.policy(),
        };
        match self.singletons.register(&claim, &handle) {
            Ok(Registration::Ignored) => {
                self.discard(&handle);
                return Ok(None);
            }
            Ok(Registration::Claimed { evicted }) if !evicted.is_empty() => {
                let ids: Vec<&str> = evicted.iter().map(|old| old.id()).collect();
                debug!(
                    "service '{}' displaced {ids:?}; they stay registered until teardown",
                    handle.id()
                );
            }
            Ok(Registration::Claimed { .. } | Registration::Unclaimed) => {}
            Err(err) => {
                self.discard(&handle);
                return Err(err);
            }
        }

        self.services.write().push(Arc::clone(&handle));

        if let Some(factory) = handle.factory() {
            for feature in factory.supported_features() {
                self.features.register(feature, Arc::clone(&handle));
            }
        }

        debug!("service '{}' is {}", handle.id(), handle.state());
        Ok(Some(handle))
    }

    /// Registers a pre-built factory under `id`, going through the same
    /// singleton arbitration as catalog services.
    ///
    /// Safe to call from several threads once bootstrap has completed.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `instance` is not a factory, and
    /// otherwise whatever [`Self::register_service`] returns.
    pub fn register_factory(
        &self,
        id: impl Into<String>,
        instance: Arc<dyn Service>,
        policy: SingletonPolicy,
    ) -> Result<Option<Arc<ServiceHandle>>> {
        let id = id.into();
        if instance.as_factory().is_none() {
            return Err(Error::validation(
                format!("{SERVICES_KEY}.{id}"),
                ValidationCode::InvalidType,
                format!(
                    "'{}' is not a service factory",
                    AsAny::service_type_name(&*instance)
                ),
            ));
        }

        let capabilities = Capabilities::detect(instance.as_ref());
        self.register_service(
            ServiceDefinition::new(id)
                .with_instance(instance)
                .with_capabilities(capabilities)
                .with_policy(policy),
        )
    }

    /// Destroys every registered service, newest first, then clears every
    /// registry.
    ///
    /// Failing destroy hooks are logged and skipped.
    pub fn destroy(&self) {
        let services = std::mem::take(&mut *self.services.write());
        for handle in services.iter().rev() {
            self.discard(handle);
        }
        self.singletons.clear();
        self.features.clear();
        self.initialized.store(false, Ordering::Release);
        if !services.is_empty() {
            info!("destroyed {} service(s)", services.len());
        }
    }

    fn instantiate(
        &self,
        definition: &ServiceDefinition,
    ) -> Result<(Arc<dyn Service>, String, Capabilities)> {
        let id = definition.id();
        let field = || format!("{SERVICES_KEY}.{id}.className");

        let implementation = match definition.implementation() {
            Some(key) => Some(self.implementations.get(key).ok_or_else(|| {
                Error::validation(
                    field(),
                    ValidationCode::ValueNotAllowed,
                    format!("implementation '{key}' is not registered"),
                )
            })?),
            None => None,
        };

        match (definition.instance(), implementation) {
            (Some(instance), Some(implementation)) => {
                if !implementation.accepts(instance.as_ref()) {
                    return Err(Error::validation(
                        field(),
                        ValidationCode::InvalidType,
                        format!(
                            "instance of '{}' does not match implementation '{}' ({})",
                            AsAny::service_type_name(&**instance),
                            implementation.key(),
                            implementation.type_name()
                        ),
                    ));
                }
                let capabilities = definition
                    .capabilities()
                    .unwrap_or_else(|| implementation.capabilities());
                Ok((Arc::clone(instance), implementation.key().to_string(), capabilities))
            }
            (Some(instance), None) => {
                let capabilities = definition
                    .capabilities()
                    .unwrap_or_else(|| Capabilities::detect(instance.as_ref()));
                let name = AsAny::service_type_name(&**instance).to_string();
                Ok((Arc::clone(instance), name, capabilities))
            }
            (None, Some(implementation)) => {
                let instance = implementation
                    .instantiate()
                    .map_err(|source| Error::initialization(id, source))?;
                Ok((instance, implementation.key().to_string(), implementation.capabilities()))
            }
            (None, None) => Err(Error::validation(
                field(),
                ValidationCode::Required,
                format!("service '{id}' has neither an implementation nor an instance"),
            )),
        }
    }

    /// The definition's scope over the generic `name:version` scope.
    fn effective_configuration(
        &self,
        definition: &ServiceDefinition,
        detail: Option<&ServiceDetail>,
    ) -> Option<Scope> {
        let generic = detail.and_then(|detail| self.store.scope(&detail.to_string()));
        match (definition.configuration().cloned(), generic) {
            (Some(bound), Some(generic)) => Some(CompositeScope::new(bound, generic).into()),
            (bound, generic) => bound.or(generic),
        }
    }

    fn start(&self, handle: &ServiceHandle, configuration: Option<&Scope>) -> anyhow::Result<()> {
        let capabilities = handle.capabilities();

        if capabilities.configurable {
            if let Some(configuration) = configuration {
                handle.instance().configure(configuration)?;
            }
        }
        handle.set_state(ServiceState::Configured);

        if capabilities.lifecycle {
            let context = ServiceContext {
                orchestrator: self,
                service_id: handle.id(),
            };
            handle.instance().initialize(&context)?;
        }
        handle.set_state(ServiceState::Initialized);
        Ok(())
    }

    fn discard(&self, handle: &ServiceHandle) {
        if handle.state() == ServiceState::Destroyed {
            return;
        }
        if handle.capabilities().lifecycle {
            if let Err(err) = handle.instance().destroy() {
                warn!("failed to destroy service '{}': {err:#}", handle.id());
            }
        }
        handle.set_state(ServiceState::Destroyed);
    }

    /// The most recently registered service with identifier `id`.
    #[must_use]
    pub fn service(&self, id: &str) -> Option<Arc<ServiceHandle>> {
        self.services
            .read()
            .iter()
            .rev()
            .find(|handle| handle.id() == id)
            .cloned()
    }

    /// Every registered service, in registration order.
    #[must_use]
    pub fn services(&self) -> Vec<Arc<ServiceHandle>> {
        self.services.read().clone()
    }

    /// The service holding the CLASS key `class`.
    #[must_use]
    pub fn service_by_class(&self, class: &str) -> Option<Arc<ServiceHandle>> {
        self.singletons.by_class(class)
    }

    /// The service holding the NAME key `name`.
    #[must_use]
    pub fn service_by_name(&self, name: &str) -> Option<Arc<ServiceHandle>> {
        self.singletons.by_name(name)
    }

    /// The service holding the (NAME, VERSION) key `detail`.
    #[must_use]
    pub fn service_by_detail(&self, detail: &ServiceDetail) -> Option<Arc<ServiceHandle>> {
        self.singletons.by_detail(detail)
    }

    /// Looks a service up through a configuration descriptor.
    ///
    /// The descriptor's `type` is `class`, `name` or `version`
    /// (case-insensitive) and selects which of `class`, `name` and
    /// `version` are read.
    ///
    /// # Examples
    ///
    /// ```yaml
    /// type: version
    /// name: cache
    /// version: "1.0"
    /// ```
    #[must_use]
    pub fn service_by_descriptor(&self, descriptor: &Scope) -> Option<Arc<ServiceHandle>> {
        let text = |key: &str| match descriptor.get(key) {
            Some(ConfigValue::String(value)) => Some(value),
            _ => None,
        };

        let kind = text("type")?;
        let Some(scope) = SingletonScope::parse(&kind.to_ascii_uppercase()) else {
            debug!("unknown service lookup type '{kind}'");
            return None;
        };
        match scope {
            SingletonScope::Class => self.service_by_class(&text("class")?),
            SingletonScope::Name => self.service_by_name(&text("name")?),
            SingletonScope::NameVersion => {
                self.service_by_detail(&ServiceDetail::new(text("name")?, text("version")?))
            }
        }
    }

    /// The first registered service of type `T`.
    #[must_use]
    pub fn get<T: Service>(&self) -> Option<Arc<T>> {
        self.services
            .read()
            .iter()
            .find_map(|handle| handle.downcast::<T>())
    }

    /// The factory registered for `feature`.
    #[must_use]
    pub fn factory_for(&self, feature: &Feature) -> Option<Arc<ServiceHandle>> {
        self.features.get(feature)
    }

    /// Returns true between a successful [`Self::initialize`] and
    /// [`Self::destroy`].
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The configuration store services are configured from.
    #[must_use]
    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }

    /// The implementation registry.
    #[must_use]
    pub fn implementations(&self) -> &ImplementationRegistry {
        &self.implementations
    }
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("services", &*self.services.read())
            .field("singletons", &self.singletons)
            .field("features", &self.features)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
