//! Placeholder expansion.
//!
//! String values of the form `{$KEYWORD:ARG1','ARG2$}` are replaced once all
//! configuration sources have been merged. Keyword handlers registered with
//! the expander are consulted first; the built-in `CONFIGREF` keyword copies
//! a value out of another scope. Anything unrecognized is left as written.

use std::env;

use log::debug;

use crate::config::path::{PropertyPath, PropertyPathResolver};
use crate::config::scope::Scope;
use crate::config::value::{ConfigMap, ConfigValue};

/// Opening marker of a placeholder.
pub const PLACEHOLDER_OPEN: &str = "{$";

/// Closing marker of a placeholder.
pub const PLACEHOLDER_CLOSE: &str = "$}";

/// Separator between placeholder arguments.
pub const ARGUMENT_SEPARATOR: &str = "','";

const CONFIG_REF_PREFIX: &str = "{$CONFIGREF:";
const ENV_PREFIX: &str = "{$ENV:";
const MAX_DEPTH: usize = 8;

/// An external placeholder resolver.
#[cfg_attr(test, mockall::automock)]
pub trait KeywordHandler {
    /// Returns true if this handler resolves `raw`.
    fn supported(&self, raw: &str) -> bool;

    /// Resolves `raw` into its replacement value.
    fn replace(&self, raw: &str) -> ConfigValue;
}

fn strip_keyword<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    let head = raw.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let body = &raw[prefix.len()..];
    body.find(PLACEHOLDER_CLOSE).map(|end| &body[..end])
}

/// Resolves `{$ENV:NAME$}` from the process environment.
///
/// Unset variables leave the placeholder unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvKeywordHandler;

impl KeywordHandler for EnvKeywordHandler {
    fn supported(&self, raw: &str) -> bool {
        strip_keyword(raw, ENV_PREFIX).is_some()
    }

    fn replace(&self, raw: &str) -> ConfigValue {
        strip_keyword(raw, ENV_PREFIX)
            .and_then(|name| env::var(name).ok())
            .map_or_else(|| ConfigValue::from(raw), ConfigValue::String)
    }
}

/// Splits a `CONFIGREF` placeholder into its target scope and path.
///
/// Returns `None` if `raw` is not a well-formed reference with at least a
/// scope name and one path segment.
///
/// # Examples
///
/// ```
/// use svcboot::config::{parse_config_ref, PropertyPath};
///
/// let (scope, path) = parse_config_ref("{$CONFIGREF:Other','x','y$}").unwrap();
/// assert_eq!(scope, "Other");
/// assert_eq!(path, PropertyPath::from("x.y"));
///
/// assert!(parse_config_ref("{$CONFIGREF:Other$}").is_none());
/// ```
#[must_use]
pub fn parse_config_ref(raw: &str) -> Option<(String, PropertyPath)> {
    let body = strip_keyword(raw, CONFIG_REF_PREFIX)?;
    let mut parts = body.split(ARGUMENT_SEPARATOR);
    let scope = parts.next()?.to_string();
    let path: Vec<String> = parts.map(str::to_string).collect();
    if path.is_empty() {
        return None;
    }
    Some((scope, PropertyPath::from(path)))
}

/// Rewrites placeholder strings throughout configuration trees.
///
/// # Examples
///
/// ```
/// use svcboot::config::{ConfigValue, MapScope, PlaceholderExpander, Scope};
/// use serde_json::json;
///
/// let other: Scope = MapScope::new("Other", ConfigValue::from(json!({"x": {"y": 42}})).into_map().unwrap()).into();
/// let lookup = |name: &str| (name == "Other").then(|| other.clone());
///
/// let expander = PlaceholderExpander::new();
/// let value = expander.expand(ConfigValue::from("{$CONFIGREF:Other','x','y$}"), &lookup);
/// assert_eq!(value, ConfigValue::from(42));
/// ```
#[derive(Default)]
pub struct PlaceholderExpander {
    handlers: Vec<Box<dyn KeywordHandler>>,
}

impl PlaceholderExpander {
    /// Creates an expander with only the built-in `CONFIGREF` keyword.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. Handlers are consulted in registration order.
    #[must_use]
    pub fn with_handler(mut self, handler: Box<dyn KeywordHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Expands every string reachable from `value`.
    ///
    /// `scopes` looks up the target scope of a `CONFIGREF`.
    pub fn expand(
        &self,
        value: ConfigValue,
        scopes: &dyn Fn(&str) -> Option<Scope>,
    ) -> ConfigValue {
        self.expand_at(value, scopes, 0)
    }

    /// Expands every string reachable from `map`.
    pub fn expand_map(&self, map: ConfigMap, scopes: &dyn Fn(&str) -> Option<Scope>) -> ConfigMap {
        map.into_iter()
            .map(|(key, value)| (key, self.expand_at(value, scopes, 0)))
            .collect()
    }

    fn expand_at(
        &self,
        value: ConfigValue,
        scopes: &dyn Fn(&str) -> Option<Scope>,
        depth: usize,
    ) -> ConfigValue {
        match value {
            ConfigValue::String(raw) => self.expand_string(raw, scopes, depth),
            ConfigValue::List(items) => ConfigValue::List(
                items
                    .into_iter()
                    .map(|item| self.expand_at(item, scopes, depth))
                    .collect(),
            ),
            ConfigValue::Map(map) => ConfigValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, self.expand_at(value, scopes, depth)))
                    .collect(),
            ),
            other => other,
        }
    }

    fn expand_string(
        &self,
        raw: String,
        scopes: &dyn Fn(&str) -> Option<Scope>,
        depth: usize,
    ) -> ConfigValue {
        if let Some(handler) = self.handlers.iter().find(|h| h.supported(&raw)) {
            return handler.replace(&raw);
        }

        if !raw.starts_with(PLACEHOLDER_OPEN) {
            return ConfigValue::String(raw);
        }

        let Some((scope_name, path)) = parse_config_ref(&raw) else {
            debug!("leaving unrecognized placeholder '{raw}' unchanged");
            return ConfigValue::String(raw);
        };

        let Some(scope) = scopes(&scope_name) else {
            debug!("placeholder '{raw}' names unknown scope '{scope_name}'");
            return ConfigValue::String(raw);
        };

        match PropertyPathResolver::get_value(&scope, &path) {
            Some(resolved) if depth < MAX_DEPTH => self.expand_at(resolved, scopes, depth + 1),
            Some(resolved) => {
                debug!("placeholder '{raw}' nests deeper than {MAX_DEPTH} levels");
                resolved
            }
            None => ConfigValue::Null,
        }
    }
}
