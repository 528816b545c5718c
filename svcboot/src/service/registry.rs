//! Registered services and singleton arbitration.
//!
//! Every started service is wrapped in a [`ServiceHandle`]. The
//! [`SingletonRegistry`] keeps three independent maps of handles, by
//! implementation reference, by name and by (name, version), and decides
//! what happens when a new service claims a key that is already taken.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result, ValidationCode};
use crate::service::definition::{ConflictAction, ServiceDetail, SingletonPolicy, SingletonScope};
use crate::service::factory::ServiceFactory;
use crate::service::implementation::{AsAny, Capabilities, Service};

/// Lifecycle state of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// Instantiated, no hook run yet.
    Created,
    /// Configuration applied.
    Configured,
    /// Initialized and running.
    Initialized,
    /// Torn down.
    Destroyed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Configured => write!(f, "configured"),
            Self::Initialized => write!(f, "initialized"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// A service instance together with what it was registered as.
pub struct ServiceHandle {
    id: String,
    implementation: String,
    capabilities: Capabilities,
    detail: Option<ServiceDetail>,
    instance: Arc<dyn Service>,
    state: Mutex<ServiceState>,
}

impl ServiceHandle {
    /// Wraps a freshly created instance.
    pub fn new(
        id: impl Into<String>,
        implementation: impl Into<String>,
        capabilities: Capabilities,
        detail: Option<ServiceDetail>,
        instance: Arc<dyn Service>,
    ) -> Self {
        Self {
            id: id.into(),
            implementation: implementation.into(),
            capabilities,
            detail,
            instance,
            state: Mutex::new(ServiceState::Created),
        }
    }

    /// Service identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Implementation reference the instance was built from, or its type
    /// name for pre-built instances.
    #[must_use]
    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    /// Hooks the service takes part in.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// (name, version) the service was registered with, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&ServiceDetail> {
        self.detail.as_ref()
    }

    /// The instance.
    #[must_use]
    pub fn instance(&self) -> &Arc<dyn Service> {
        &self.instance
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ServiceState) {
        *self.state.lock() = state;
    }

    /// The instance as its concrete type.
    #[must_use]
    pub fn downcast<T: Service>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance)
            .into_any_arc()
            .downcast::<T>()
            .ok()
    }

    /// The factory face of the instance, if it was registered as a factory.
    #[must_use]
    pub fn factory(&self) -> Option<&dyn ServiceFactory> {
        if self.capabilities.factory {
            self.instance.as_factory()
        } else {
            None
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field("type", &AsAny::service_type_name(self.instance.as_ref()))
            .field("capabilities", &self.capabilities)
            .field("detail", &self.detail)
            .field("state", &self.state())
            .finish()
    }
}

/// Keys a new service claims in the singleton maps.
#[derive(Debug, Clone, Default)]
pub struct Claim {
    /// Implementation reference, for [`SingletonScope::Class`].
    pub class: Option<String>,
    /// (name, version), for [`SingletonScope::Name`] and
    /// [`SingletonScope::NameVersion`].
    pub detail: Option<ServiceDetail>,
    /// Policy deciding which key applies and what a conflict does. `None`
    /// claims nothing.
    pub policy: Option<SingletonPolicy>,
}

/// Outcome of a registration attempt.
#[derive(Debug)]
pub enum Registration {
    /// Every applicable key was claimed. `evicted` holds handles whose
    /// entries were overwritten.
    Claimed {
        /// Handles replaced under [`ConflictAction::Replace`].
        evicted: Vec<Arc<ServiceHandle>>,
    },
    /// No key applied to the claim; nothing was recorded.
    Unclaimed,
    /// The key was taken and the policy said to keep the existing entry.
    Ignored,
}

enum Decision {
    Proceed,
    Skip,
}

/// Arbitrates singleton conflicts across the class, name and
/// (name, version) maps.
///
/// Lookups take a read lock per map. Registrations are serialized, so two
/// concurrent claims on the same key always go through the conflict table.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use svcboot::service::{
///     Capabilities, Claim, ConflictAction, Registration, Service, ServiceHandle,
///     SingletonPolicy, SingletonRegistry, SingletonScope,
/// };
///
/// struct Cache;
/// impl Service for Cache {}
///
/// let registry = SingletonRegistry::new();
/// let claim = Claim {
///     class: Some("cache".to_string()),
///     detail: None,
///     policy: Some(SingletonPolicy::new(SingletonScope::Class, ConflictAction::Ignore)),
/// };
///
/// let first = Arc::new(ServiceHandle::new("a", "cache", Capabilities::NONE, None, Arc::new(Cache)));
/// let second = Arc::new(ServiceHandle::new("b", "cache", Capabilities::NONE, None, Arc::new(Cache)));
///
/// assert!(matches!(registry.register(&claim, &first).unwrap(), Registration::Claimed { .. }));
/// assert!(matches!(registry.register(&claim, &second).unwrap(), Registration::Ignored));
/// assert_eq!(registry.by_class("cache").unwrap().id(), "a");
/// ```
#[derive(Default)]
pub struct SingletonRegistry {
    by_class: RwLock<HashMap<String, Arc<ServiceHandle>>>,
    by_name: RwLock<HashMap<String, Arc<ServiceHandle>>>,
    by_detail: RwLock<HashMap<ServiceDetail, Arc<ServiceHandle>>>,
    registration: Mutex<()>,
}

impl SingletonRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `handle` under every key of `claim` its policy applies to.
    ///
    /// | existing entry | `ERROR` | `IGNORE` | `REPLACE` |
    /// |---|---|---|---|
    /// | present | fails | keeps the old entry | overwrites it |
    /// | absent | records | records | records |
    ///
    /// # Errors
    ///
    /// Returns a validation error if a key is taken and the policy's
    /// conflict action is [`ConflictAction::Error`].
    pub fn register(&self, claim: &Claim, handle: &Arc<ServiceHandle>) -> Result<Registration> {
        let Some(policy) = claim.policy else {
            let id = handle.id();
            debug!("service '{id}' has no singleton policy; not registering");
            return Ok(Registration::Unclaimed);
        };

        let _guard = self.registration.lock();
        let mut evicted = Vec::new();

        match policy.scope {
            SingletonScope::Class => {
                let Some(class) = claim.class.as_ref() else {
                    return Ok(Registration::Unclaimed);
                };
                let taken = self.by_class.read().contains_key(class);
                let describe = || format!("class '{class}'");
                if let Decision::Skip = decide(taken, policy, handle, describe)? {
                    return Ok(Registration::Ignored);
                }
                let mut map = self.by_class.write();
                evicted.extend(map.insert(class.clone(), Arc::clone(handle)));
            }
            SingletonScope::Name => {
                let Some(name) = claim.detail.as_ref().map(ServiceDetail::name) else {
                    return Ok(Registration::Unclaimed);
                };
                let taken = self.by_name.read().contains_key(name);
                let describe = || format!("name '{name}'");
                if let Decision::Skip = decide(taken, policy, handle, describe)? {
                    return Ok(Registration::Ignored);
                }
                let mut map = self.by_name.write();
                evicted.extend(map.insert(name.to_string(), Arc::clone(handle)));
            }
            SingletonScope::NameVersion => {
                let Some(detail) = claim.detail.as_ref() else {
                    return Ok(Registration::Unclaimed);
                };
                let taken = self.by_detail.read().contains_key(detail);
                let describe = || format!("detail '{detail}'");
                if let Decision::Skip = decide(taken, policy, handle, describe)? {
                    return Ok(Registration::Ignored);
                }
                let mut map = self.by_detail.write();
                evicted.extend(map.insert(detail.clone(), Arc::clone(handle)));
            }
        }

        for old in &evicted {
            info!(
                "service '{}' replaces '{}' ({policy})",
                handle.id(),
                old.id()
            );
        }
        Ok(Registration::Claimed { evicted })
    }

    /// The service registered for an implementation reference.
    #[must_use]
    pub fn by_class(&self, class: &str) -> Option<Arc<ServiceHandle>> {
        self.by_class.read().get(class).cloned()
    }

    /// The service registered for a name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<ServiceHandle>> {
        self.by_name.read().get(name).cloned()
    }

    /// The service registered for a (name, version) pair.
    #[must_use]
    pub fn by_detail(&self, detail: &ServiceDetail) -> Option<Arc<ServiceHandle>> {
        self.by_detail.read().get(detail).cloned()
    }

    /// Returns true if no map holds an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_class.read().is_empty()
            && self.by_name.read().is_empty()
            && self.by_detail.read().is_empty()
    }

    /// Empties every map.
    pub fn clear(&self) {
        let _guard = self.registration.lock();
        self.by_class.write().clear();
        self.by_name.write().clear();
        self.by_detail.write().clear();
    }
}

impl fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("by_class", &self.by_class.read().len())
            .field("by_name", &self.by_name.read().len())
            .field("by_detail", &self.by_detail.read().len())
            .finish()
    }
}

fn decide(
    taken: bool,
    policy: SingletonPolicy,
    handle: &ServiceHandle,
    key: impl FnOnce() -> String,
) -> Result<Decision> {
    if !taken {
        return Ok(Decision::Proceed);
    }
    match policy.on_conflict {
        ConflictAction::Error => Err(Error::validation(
            "singleton",
            ValidationCode::NotUnique,
            format!(
                "an instance for {} already exists; service '{}' cannot be registered",
                key(),
                handle.id()
            ),
        )),
        ConflictAction::Ignore => {
            info!(
                "ignoring service '{}': an instance for {} already exists",
                handle.id(),
                key()
            );
            Ok(Decision::Skip)
        }
        ConflictAction::Replace => Ok(Decision::Proceed),
    }
}
