//! Parsing the declarative service catalog.
//!
//! The catalog lives in the `ServiceManager` configuration scope:
//!
//! ```yaml
//! ServiceManager:
//!   service-sequence: [metrics]
//!   services:
//!     cache:
//!       className: memory-cache
//!       singleton: NAME
//!       handle-multiple-instance: ERROR
//!       lookup-details: {name: cache, version: "1.0"}
//!       configuration-name: CacheSettings
//!       dependencies: [metrics]
//!     metrics:
//!       className: metrics
//!       enabled: true
//! ```
//!
//! Structural problems are collected, not raised, so one bad entry does
//! not hide problems in the others.

use std::collections::BTreeMap;

use log::debug;

use crate::config::{ConfigValue, ConfigurationStore, Scope};
use crate::error::{ConfigErrorKind, Error, Result, ValidationCode, ValidationError};
use crate::service::definition::{
    ConflictAction, ServiceDefinition, ServiceDetail, SingletonPolicy, SingletonScope,
};
use crate::service::implementation::ImplementationRegistry;

/// Scope holding the service catalog.
pub const SERVICE_MANAGER_SCOPE: &str = "ServiceManager";

/// Key of the per-service definitions inside [`SERVICE_MANAGER_SCOPE`].
pub const SERVICES_KEY: &str = "services";

/// Key of the explicit initialization order inside [`SERVICE_MANAGER_SCOPE`].
pub const SERVICE_SEQUENCE_KEY: &str = "service-sequence";

const ENABLED: &str = "enabled";
const CLASS_NAME: &str = "className";
const SINGLETON: &str = "singleton";
const HANDLE_MULTIPLE: &str = "handle-multiple-instance";
const LOOKUP_DETAILS: &str = "lookup-details";
const CONFIGURATION_NAME: &str = "configuration-name";
const INLINE_CONFIGURATION: &str = "configuration";
const DEPENDENCIES: &str = "dependencies";

/// Enabled service definitions plus every problem found reading them.
#[derive(Debug, Default)]
pub struct ServiceCatalog {
    definitions: BTreeMap<String, ServiceDefinition>,
    sequence: Vec<String>,
    errors: Vec<ValidationError>,
}

impl ServiceCatalog {
    /// Creates a catalog from definitions built by hand.
    #[must_use]
    pub fn from_definitions(definitions: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|definition| (definition.id().to_string(), definition))
                .collect(),
            ..Self::default()
        }
    }

    /// Sets the explicit initialization order.
    #[must_use]
    pub fn with_sequence<I, S>(mut self, sequence: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sequence = sequence.into_iter().map(Into::into).collect();
        self
    }

    /// Definitions by identifier.
    #[must_use]
    pub fn definitions(&self) -> &BTreeMap<String, ServiceDefinition> {
        &self.definitions
    }

    /// The definition for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ServiceDefinition> {
        self.definitions.get(id)
    }

    /// Removes and returns the definition for `id`.
    pub fn take(&mut self, id: &str) -> Option<ServiceDefinition> {
        self.definitions.remove(id)
    }

    /// Identifiers from `service-sequence`, as configured.
    #[must_use]
    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    /// Problems found while reading the catalog.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Number of enabled definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if no service is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Builds a [`ServiceCatalog`] from a configuration store.
pub struct ServiceCatalogBuilder<'a> {
    store: &'a ConfigurationStore,
    implementations: &'a ImplementationRegistry,
}

impl<'a> ServiceCatalogBuilder<'a> {
    /// Creates a builder reading from `store` and resolving implementation
    /// references against `implementations`.
    #[must_use]
    pub fn new(store: &'a ConfigurationStore, implementations: &'a ImplementationRegistry) -> Self {
        Self {
            store,
            implementations,
        }
    }

    /// Reads every enabled service definition.
    ///
    /// # Errors
    ///
    /// Returns a missing-configuration error if the `ServiceManager` scope
    /// or its `services` map is absent. Problems inside individual
    /// definitions are returned in [`ServiceCatalog::errors`] instead.
    pub fn build(&self) -> Result<ServiceCatalog> {
        let manager = self.store.require(SERVICE_MANAGER_SCOPE)?;
        let services = manager.subset(SERVICES_KEY).ok_or_else(|| {
            Error::configuration(
                ConfigErrorKind::Missing,
                format!("no '{SERVICES_KEY}' map in configuration scope '{SERVICE_MANAGER_SCOPE}'"),
            )
        })?;

        let mut catalog = ServiceCatalog {
            sequence: read_sequence(&manager),
            ..ServiceCatalog::default()
        };

        for id in services.property_names() {
            let Some(entry) = services.subset(&id) else {
                catalog.errors.push(ValidationError::new(
                    field(&id, ""),
                    ValidationCode::InvalidType,
                    format!("definition of service '{id}' is not a map"),
                ));
                continue;
            };

            match entry.get(ENABLED) {
                None | Some(ConfigValue::Bool(true)) => {}
                Some(ConfigValue::Bool(false)) => {
                    debug!("skipping service '{id}': not enabled");
                    continue;
                }
                Some(other) => {
                    catalog.errors.push(ValidationError::new(
                        field(&id, ENABLED),
                        ValidationCode::InvalidType,
                        format!("expected a boolean, found {}", other.type_name()),
                    ));
                    continue;
                }
            }

            let definition = self.extract(&id, &entry, &mut catalog.errors);
            catalog.definitions.insert(id, definition);
        }

        Ok(catalog)
    }

    /// Builds the definition for one catalog entry, appending any problem
    /// to `errors`.
    pub fn extract(
        &self,
        id: &str,
        entry: &Scope,
        errors: &mut Vec<ValidationError>,
    ) -> ServiceDefinition {
        let mut definition = ServiceDefinition::new(id);

        let scope = read_enum(
            entry,
            id,
            SINGLETON,
            "VERSION",
            SingletonScope::parse,
            errors,
        );
        let action = read_enum(
            entry,
            id,
            HANDLE_MULTIPLE,
            "REPLACE",
            ConflictAction::parse,
            errors,
        );
        definition = match (scope, action) {
            (Some(scope), Some(action)) => {
                definition.with_policy(SingletonPolicy::new(scope, action))
            }
            _ => definition.without_policy(),
        };

        match entry.get(CLASS_NAME) {
            Some(ConfigValue::String(class)) if !class.is_empty() => {
                if !self.implementations.contains(&class) {
                    errors.push(ValidationError::new(
                        field(id, CLASS_NAME),
                        ValidationCode::ValueNotAllowed,
                        format!("implementation '{class}' is not registered"),
                    ));
                }
                definition = definition.with_implementation(class);
            }
            _ => errors.push(ValidationError::new(
                field(id, CLASS_NAME),
                ValidationCode::Required,
                "the implementation of the service must be named",
            )),
        }

        if let Some(details) = entry.subset(LOOKUP_DETAILS) {
            let name = non_empty_string(&details, "name");
            let version = non_empty_string(&details, "version");
            for (key, value) in [("name", &name), ("version", &version)] {
                if value.is_none() {
                    errors.push(ValidationError::new(
                        field(id, &format!("{LOOKUP_DETAILS}.{key}")),
                        ValidationCode::Required,
                        format!("lookup details must contain a {key}"),
                    ));
                }
            }
            if let (Some(name), Some(version)) = (name, version) {
                definition = definition.with_detail(ServiceDetail::new(name, version));
            }
        }

        if let Some(configuration) = self.bound_configuration(id, entry) {
            definition = definition.with_configuration(configuration);
        }

        match entry.get(DEPENDENCIES) {
            None | Some(ConfigValue::Null) => {}
            Some(ConfigValue::List(items)) => {
                let mut dependencies = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ConfigValue::String(dependency) => dependencies.push(dependency),
                        other => errors.push(ValidationError::new(
                            field(id, DEPENDENCIES),
                            ValidationCode::InvalidType,
                            format!(
                                "dependency of service '{id}' must be a string, found {}",
                                other.type_name()
                            ),
                        )),
                    }
                }
                definition = definition.with_dependencies(dependencies);
            }
            Some(other) => errors.push(ValidationError::new(
                field(id, DEPENDENCIES),
                ValidationCode::InvalidType,
                format!(
                    "expected a list of service identifiers, found {}",
                    other.type_name()
                ),
            )),
        }

        definition
    }

    /// Picks the configuration scope for a service: the scope named by
    /// `configuration-name`, else the scope named after the service, else
    /// the inline `configuration` map.
    fn bound_configuration(&self, id: &str, entry: &Scope) -> Option<Scope> {
        let named = non_empty_string(entry, CONFIGURATION_NAME).and_then(|name| {
            let scope = self.store.scope(&name);
            if scope.is_none() {
                debug!("configuration '{name}' for service '{id}' not found");
            }
            scope
        });
        named
            .or_else(|| self.store.scope(id))
            .or_else(|| entry.subset(INLINE_CONFIGURATION))
    }
}

fn field(id: &str, key: &str) -> String {
    if key.is_empty() {
        format!("{SERVICES_KEY}.{id}")
    } else {
        format!("{SERVICES_KEY}.{id}.{key}")
    }
}

fn non_empty_string(scope: &Scope, key: &str) -> Option<String> {
    match scope.get(key) {
        Some(ConfigValue::String(value)) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_enum<T>(
    entry: &Scope,
    id: &str,
    key: &str,
    default: &str,
    parse: fn(&str) -> Option<T>,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    let raw = match entry.get(key) {
        None | Some(ConfigValue::Null) => default.to_string(),
        Some(ConfigValue::String(raw)) => raw,
        Some(other) => {
            errors.push(ValidationError::new(
                field(id, key),
                ValidationCode::InvalidType,
                format!("expected a string, found {}", other.type_name()),
            ));
            return None;
        }
    };
    let parsed = parse(&raw);
    if parsed.is_none() {
        errors.push(ValidationError::new(
            field(id, key),
            ValidationCode::ValueNotAllowed,
            format!("'{raw}' is not a valid value"),
        ));
    }
    parsed
}

fn read_sequence(manager: &Scope) -> Vec<String> {
    match manager.get(SERVICE_SEQUENCE_KEY) {
        Some(ConfigValue::List(items)) => items
            .iter()
            .filter_map(|item| {
                let id = item.as_str().filter(|id| !id.is_empty());
                if id.is_none() {
                    let kind = item.type_name();
                    debug!("ignoring '{SERVICE_SEQUENCE_KEY}' entry of type {kind}");
                }
                id.map(str::to_string)
            })
            .collect(),
        Some(other) => {
            let kind = other.type_name();
            debug!("ignoring '{SERVICE_SEQUENCE_KEY}' of type {kind}");
            Vec::new()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::implementation::{Capabilities, Service};
    use serde_json::json;

    #[derive(Default)]
    struct Noop;
    impl Service for Noop {}

    fn implementations() -> ImplementationRegistry {
        ImplementationRegistry::new()
            .with("noop", Capabilities::MANAGED, Noop::default)
            .with("other", Capabilities::NONE, Noop::default)
    }

    fn store(bootstrap: serde_json::Value) -> ConfigurationStore {
        ConfigurationStore::builder()
            .with_bootstrap(ConfigValue::from(bootstrap).into_map().unwrap())
            .skip_env()
            .skip_files()
            .build()
            .unwrap()
    }

    fn catalog(bootstrap: serde_json::Value) -> ServiceCatalog {
        let store = store(bootstrap);
        let implementations = implementations();
        ServiceCatalogBuilder::new(&store, &implementations)
            .build()
            .unwrap()
    }

    fn error_fields(catalog: &ServiceCatalog) -> Vec<&str> {
        catalog.errors().iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_full_definition() {
        let catalog = catalog(json!({
            "ServiceManager": {
                "service-sequence": ["b", 7, ""],
                "services": {
                    "a": {
                        "className": "noop",
                        "singleton": "NAME",
                        "handle-multiple-instance": "ERROR",
                        "lookup-details": {"name": "alpha", "version": "2"},
                        "dependencies": ["b"]
                    },
                    "b": {"className": "other", "enabled": true}
                }
            }
        }));

        assert!(catalog.errors().is_empty(), "{:?}", catalog.errors());
        assert_eq!(catalog.sequence(), ["b"]);

        let a = catalog.get("a").unwrap();
        assert_eq!(a.implementation(), Some("noop"));
        assert_eq!(
            a.policy(),
            Some(SingletonPolicy::new(SingletonScope::Name, ConflictAction::Error))
        );
        assert_eq!(a.detail(), Some(&ServiceDetail::new("alpha", "2")));
        assert_eq!(a.dependencies(), ["b"]);

        let b = catalog.get("b").unwrap();
        assert_eq!(b.policy(), Some(SingletonPolicy::default()));
        assert!(b.dependencies().is_empty());
    }

    #[test]
    fn test_disabled_services_skipped() {
        let catalog = catalog(json!({
            "ServiceManager": {"services": {
                "on": {"className": "noop"},
                "off": {"className": "noop", "enabled": false}
            }}
        }));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("off").is_none());
    }

    #[test]
    fn test_errors_accumulate_across_definitions() {
        let catalog = catalog(json!({
            "ServiceManager": {"services": {
                "a": {"singleton": "EVERYWHERE"},
                "b": {"className": "missing", "handle-multiple-instance": "MERGE"},
                "c": {"className": "noop", "lookup-details": {"name": "c"}},
                "d": {"className": "noop", "enabled": "yes"},
                "e": {"className": "noop", "dependencies": ["a", 3]},
                "f": 42
            }}
        }));

        let fields = error_fields(&catalog);
        assert!(fields.contains(&"services.a.singleton"));
        assert!(fields.contains(&"services.a.className"));
        assert!(fields.contains(&"services.b.className"));
        assert!(fields.contains(&"services.b.handle-multiple-instance"));
        assert!(fields.contains(&"services.c.lookup-details.version"));
        assert!(fields.contains(&"services.d.enabled"));
        assert!(fields.contains(&"services.e.dependencies"));
        assert!(fields.contains(&"services.f"));

        // Bad definitions are still parsed as far as possible.
        assert!(catalog.get("a").unwrap().policy().is_none());
        assert!(catalog.get("c").unwrap().detail().is_none());
        assert_eq!(catalog.get("e").unwrap().dependencies(), ["a"]);
    }

    #[test]
    fn test_unparsable_policy_disables_registration() {
        let catalog = catalog(json!({
            "ServiceManager": {"services": {
                "scope": {"className": "noop", "singleton": "version"},
                "action": {"className": "noop", "handle-multiple-instance": "MERGE"},
                "valid": {"className": "noop", "singleton": "NAME"}
            }}
        }));

        assert_eq!(catalog.errors().len(), 2);
        assert!(catalog.get("scope").unwrap().policy().is_none());
        assert!(catalog.get("action").unwrap().policy().is_none());
        assert_eq!(
            catalog.get("valid").unwrap().policy(),
            Some(SingletonPolicy::new(SingletonScope::Name, ConflictAction::Replace))
        );
    }

    #[test]
    fn test_configuration_binding_precedence() {
        let catalog = catalog(json!({
            "ServiceManager": {"services": {
                "named": {
                    "className": "noop",
                    "configuration-name": "Shared",
                    "configuration": {"x": 0}
                },
                "fallback": {"className": "noop", "configuration-name": "Nowhere"},
                "inline": {"className": "noop", "configuration": {"x": 3}},
                "bare": {"className": "noop"}
            }},
            "Shared": {"x": 1},
            "fallback": {"x": 2}
        }));

        let x = |id: &str| {
            let configuration = catalog.get(id).unwrap().configuration();
            configuration.and_then(|c| c.get("x"))
        };
        assert_eq!(x("named"), Some(ConfigValue::from(1)));
        assert_eq!(x("fallback"), Some(ConfigValue::from(2)));
        assert_eq!(x("inline"), Some(ConfigValue::from(3)));
        assert!(catalog.get("bare").unwrap().configuration().is_none());
    }

    #[test]
    fn test_missing_catalog_scope() {
        let store = store(json!({"Other": {}}));
        let implementations = implementations();
        let builder = ServiceCatalogBuilder::new(&store, &implementations);
        let err = builder.build().unwrap_err();
        assert!(err.is_configuration(ConfigErrorKind::Missing));

        let store = store_without_services();
        let builder = ServiceCatalogBuilder::new(&store, &implementations);
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("services"));
    }

    fn store_without_services() -> ConfigurationStore {
        store(json!({"ServiceManager": {"service-sequence": []}}))
    }

    #[test]
    fn test_from_definitions() {
        let catalog = ServiceCatalog::from_definitions([ServiceDefinition::new("x")])
            .with_sequence(["x"]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.sequence(), ["x"]);
    }
}
