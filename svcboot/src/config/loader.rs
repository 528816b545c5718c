//! Raw configuration loading.
//!
//! Reads configuration files into [`ConfigMap`] trees. The format is picked
//! from the file extension: `.yaml`/`.yml` are read as YAML, everything else
//! as JSON.

use std::fs;
use std::path::Path;

use crate::config::value::{ConfigMap, ConfigValue};
use crate::error::{Error, Result};

/// Loads configuration trees from files and strings.
///
/// # Examples
///
/// ```
/// use svcboot::config::{ConfigLoader, SourceFormat};
///
/// let map = ConfigLoader::parse_str("ServiceManager:\n  services: {}\n", SourceFormat::Yaml).unwrap();
/// assert!(map.contains_key("ServiceManager"));
/// ```
pub struct ConfigLoader;

/// Byte-level format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JSON documents.
    Json,
    /// YAML documents.
    Yaml,
}

impl SourceFormat {
    /// Picks the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

impl ConfigLoader {
    /// Load a single configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, cannot be parsed, or
    /// does not hold a map at the top level.
    pub fn load_file(path: &Path) -> Result<ConfigMap> {
        let contents = fs::read_to_string(path).map_err(|e| Error::Load {
            path: path.to_path_buf(),
            reason: format!("failed to read file: {e}"),
        })?;

        Self::parse_str(&contents, SourceFormat::from_path(path)).map_err(|e| Error::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parse a configuration document.
    ///
    /// An empty document is an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or does not hold a
    /// map at the top level.
    pub fn parse_str(contents: &str, format: SourceFormat) -> Result<ConfigMap> {
        if contents.trim().is_empty() {
            return Ok(ConfigMap::new());
        }

        let value: ConfigValue = match format {
            SourceFormat::Json => serde_json::from_str(contents)?,
            SourceFormat::Yaml => serde_yaml::from_str(contents)?,
        };

        match value {
            ConfigValue::Map(map) => Ok(map),
            ConfigValue::Null => Ok(ConfigMap::new()),
            other => Err(Error::Internal {
                message: format!(
                    "expected a map at the top level, found {}",
                    other.type_name()
                ),
            }),
        }
    }

    /// Write a configuration tree back to a file in the format implied by
    /// its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_file(path: &Path, map: &ConfigMap) -> Result<()> {
        let contents = match SourceFormat::from_path(path) {
            SourceFormat::Json => serde_json::to_string_pretty(map)?,
            SourceFormat::Yaml => serde_yaml::to_string(map)?,
        };
        fs::write(path, contents)?;
        Ok(())
    }
}
