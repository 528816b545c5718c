//! Declarative service definitions.
//!
//! A [`ServiceDefinition`] describes one service to bring up: where its
//! instance comes from, what it depends on, how singleton conflicts are
//! handled and which configuration it receives.

use std::fmt;
use std::sync::Arc;

use crate::config::Scope;
use crate::service::implementation::{AsAny, Capabilities, Service};

/// Key space under which at most one instance of a service is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingletonScope {
    /// One instance per implementation reference.
    Class,
    /// One instance per service name.
    Name,
    /// One instance per (name, version) pair.
    NameVersion,
}

impl SingletonScope {
    /// Parses a configured scope name.
    ///
    /// Names are case-sensitive. `VERSION` and `NAME_VERSION` both select
    /// [`SingletonScope::NameVersion`].
    ///
    /// # Examples
    ///
    /// ```
    /// use svcboot::service::SingletonScope;
    ///
    /// assert_eq!(SingletonScope::parse("CLASS"), Some(SingletonScope::Class));
    /// assert_eq!(SingletonScope::parse("VERSION"), Some(SingletonScope::NameVersion));
    /// assert_eq!(SingletonScope::parse("class"), None);
    /// ```
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CLASS" => Some(Self::Class),
            "NAME" => Some(Self::Name),
            "VERSION" | "NAME_VERSION" => Some(Self::NameVersion),
            _ => None,
        }
    }
}

impl fmt::Display for SingletonScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => write!(f, "CLASS"),
            Self::Name => write!(f, "NAME"),
            Self::NameVersion => write!(f, "VERSION"),
        }
    }
}

/// What to do when a singleton key is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictAction {
    /// Fail the registration.
    Error,
    /// Keep the existing instance and drop the new one.
    Ignore,
    /// Overwrite the existing entry with the new instance.
    Replace,
}

impl ConflictAction {
    /// Parses a configured action name (`ERROR`, `IGNORE` or `REPLACE`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ERROR" => Some(Self::Error),
            "IGNORE" => Some(Self::Ignore),
            "REPLACE" => Some(Self::Replace),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Ignore => write!(f, "IGNORE"),
            Self::Replace => write!(f, "REPLACE"),
        }
    }
}

/// Singleton scope plus conflict handling.
///
/// The default is one instance per (name, version), replacing on conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SingletonPolicy {
    /// Key space checked on registration.
    pub scope: SingletonScope,
    /// Action taken when the key is taken.
    pub on_conflict: ConflictAction,
}

impl SingletonPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(scope: SingletonScope, on_conflict: ConflictAction) -> Self {
        Self { scope, on_conflict }
    }
}

impl Default for SingletonPolicy {
    fn default() -> Self {
        Self::new(SingletonScope::NameVersion, ConflictAction::Replace)
    }
}

impl fmt::Display for SingletonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.on_conflict)
    }
}

/// Name and version of a service.
///
/// Displayed as `name:version`, which is also the name of the generic
/// configuration scope shared by every instance of that service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceDetail {
    name: String,
    version: String,
}

impl ServiceDetail {
    /// Creates a service detail.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ServiceDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// One service to instantiate, configure and initialize.
///
/// Built once per bootstrap, either from the service catalog or by hand,
/// and consumed by [`LifecycleOrchestrator::register_service`].
///
/// [`LifecycleOrchestrator::register_service`]: crate::service::LifecycleOrchestrator::register_service
///
/// # Examples
///
/// ```
/// use svcboot::service::{ConflictAction, ServiceDefinition, ServiceDetail, SingletonPolicy, SingletonScope};
///
/// let definition = ServiceDefinition::new("cache")
///     .with_implementation("memory-cache")
///     .with_dependencies(["metrics"])
///     .with_detail(ServiceDetail::new("cache", "1.0"))
///     .with_policy(SingletonPolicy::new(SingletonScope::Name, ConflictAction::Error));
///
/// assert_eq!(definition.dependencies(), ["metrics"]);
/// assert_eq!(definition.detail().unwrap().to_string(), "cache:1.0");
/// ```
#[derive(Clone)]
pub struct ServiceDefinition {
    id: String,
    implementation: Option<String>,
    instance: Option<Arc<dyn Service>>,
    capabilities: Option<Capabilities>,
    dependencies: Vec<String>,
    policy: Option<SingletonPolicy>,
    detail: Option<ServiceDetail>,
    configuration: Option<Scope>,
}

impl ServiceDefinition {
    /// Creates a definition with the default singleton policy and nothing
    /// else set.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            instance: None,
            capabilities: None,
            dependencies: Vec::new(),
            policy: Some(SingletonPolicy::default()),
            detail: None,
            configuration: None,
        }
    }

    /// Names the implementation to instantiate.
    #[must_use]
    pub fn with_implementation(mut self, key: impl Into<String>) -> Self {
        self.implementation = Some(key.into());
        self
    }

    /// Supplies a pre-built instance.
    #[must_use]
    pub fn with_instance(mut self, instance: Arc<dyn Service>) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Declares the hooks a pre-built instance takes part in.
    ///
    /// Without this, a pre-built instance is configured and initialized,
    /// and is treated as a factory if it exposes one.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Sets the identifiers this service depends on.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the singleton policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SingletonPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Opts out of singleton registration entirely.
    #[must_use]
    pub fn without_policy(mut self) -> Self {
        self.policy = None;
        self
    }

    /// Sets the (name, version) detail.
    #[must_use]
    pub fn with_detail(mut self, detail: ServiceDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Binds the configuration scope handed to the service.
    #[must_use]
    pub fn with_configuration(mut self, configuration: Scope) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Implementation reference, if any.
    #[must_use]
    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }

    /// Pre-built instance, if any.
    #[must_use]
    pub fn instance(&self) -> Option<&Arc<dyn Service>> {
        self.instance.as_ref()
    }

    /// Declared capabilities of a pre-built instance, if any.
    #[must_use]
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities
    }

    /// Identifiers this service depends on, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Singleton policy, or `None` if the service is never registered in
    /// the singleton maps.
    #[must_use]
    pub fn policy(&self) -> Option<SingletonPolicy> {
        self.policy
    }

    /// (name, version) detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&ServiceDetail> {
        self.detail.as_ref()
    }

    /// Bound configuration scope, if any.
    #[must_use]
    pub fn configuration(&self) -> Option<&Scope> {
        self.configuration.as_ref()
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field(
                "instance",
                &self.instance.as_deref().map(AsAny::service_type_name),
            )
            .field("dependencies", &self.dependencies)
            .field("policy", &self.policy)
            .field("detail", &self.detail)
            .field(
                "configuration",
                &self.configuration.as_ref().map(Scope::name),
            )
            .finish_non_exhaustive()
    }
}
