//! Common test utilities for integration tests.
//!
//! This module provides fixture services, store builders and an
//! environment guard shared by the svcboot integration tests.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use svcboot::config::{ConfigMap, ConfigValue, ConfigurationStore, Scope};
use svcboot::service::{Capabilities, ImplementationRegistry, Service, ServiceContext};

/// Shared, ordered record of lifecycle hooks.
pub type Events = Arc<Mutex<Vec<String>>>;

/// Creates an empty event log.
#[allow(dead_code)]
pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

/// Service names recorded for `hook`, in call order.
#[allow(dead_code)]
pub fn hooks(events: &Events, hook: &str) -> Vec<String> {
    let prefix = format!("{hook}:");
    events
        .lock()
        .iter()
        .filter_map(|event| event.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

/// A service that records every hook it receives.
///
/// Its configuration controls its behavior:
/// - `fail: configure|initialize|destroy` makes that hook fail
/// - `needs: <id>` makes initialize fail unless `<id>` is already running
pub struct Recorder {
    name: String,
    events: Events,
    configuration: Mutex<Option<Scope>>,
}

#[allow(dead_code)]
impl Recorder {
    /// Creates a recorder logging into `events` under `name`.
    pub fn new(name: &str, events: &Events) -> Self {
        Self {
            name: name.to_string(),
            events: Arc::clone(events),
            configuration: Mutex::new(None),
        }
    }

    /// A property of the configuration the service received.
    pub fn setting(&self, key: &str) -> Option<ConfigValue> {
        self.configuration.lock().as_ref().and_then(|c| c.get(key))
    }

    fn text(&self, key: &str) -> Option<String> {
        self.setting(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn record(&self, hook: &str) -> anyhow::Result<()> {
        self.events.lock().push(format!("{hook}:{}", self.name));
        if self.text("fail").as_deref() == Some(hook) {
            anyhow::bail!("{hook} of {} failed", self.name);
        }
        Ok(())
    }
}

impl Service for Recorder {
    fn configure(&self, configuration: &Scope) -> anyhow::Result<()> {
        *self.configuration.lock() = Some(configuration.clone());
        self.record("configure")
    }

    fn initialize(&self, context: &ServiceContext<'_>) -> anyhow::Result<()> {
        if let Some(needed) = self.text("needs") {
            anyhow::ensure!(
                context.service(&needed).is_some(),
                "{needed} is not running"
            );
        }
        self.record("initialize")
    }

    fn destroy(&self) -> anyhow::Result<()> {
        self.record("destroy")
    }
}

/// Registers one [`Recorder`] implementation per name, keyed by that name.
#[allow(dead_code)]
pub fn recorders(events: &Events, names: &[&str]) -> ImplementationRegistry {
    let mut registry = ImplementationRegistry::new();
    for name in names {
        let events = Arc::clone(events);
        let name = (*name).to_string();
        registry.register(name.clone(), Capabilities::MANAGED, move || {
            Recorder::new(&name, &events)
        });
    }
    registry
}

/// Converts a JSON literal into a configuration map.
#[allow(dead_code)]
pub fn config_map(value: serde_json::Value) -> ConfigMap {
    ConfigValue::from(value)
        .into_map()
        .expect("fixture must be a JSON object")
}

/// Builds an isolated store from an in-memory bootstrap map.
#[allow(dead_code)]
pub fn store(bootstrap: serde_json::Value) -> ConfigurationStore {
    ConfigurationStore::builder()
        .with_bootstrap(config_map(bootstrap))
        .skip_env()
        .skip_files()
        .build()
        .expect("fixture store must build")
}

/// Writes `contents` to `dir/filename` and returns the path.
#[allow(dead_code)]
pub fn write_file(dir: &Path, filename: &str, contents: &str) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, contents).expect("failed to write fixture file");
    path
}

/// RAII guard for setting and restoring environment variables.
///
/// Tests using it must be marked `#[serial]`.
pub struct EnvGuard {
    key: String,
    old_value: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    /// Sets `key` to `value` until the guard is dropped.
    pub fn set(key: &str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let old_value = env::var(key).ok();
        env::set_var(key, value);
        Self {
            key: key.to_string(),
            old_value,
        }
    }

    /// Removes `key` until the guard is dropped.
    pub fn remove(key: &str) -> Self {
        let old_value = env::var(key).ok();
        env::remove_var(key);
        Self {
            key: key.to_string(),
            old_value,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.old_value {
            Some(val) => env::set_var(&self.key, val),
            None => env::remove_var(&self.key),
        }
    }
}
