//! Error types for the svcboot library.
//!
//! Four families matter to callers: validation errors (aggregated, one per
//! offending field), configuration errors, per-service initialization errors
//! and internal errors. The remaining variants wrap I/O and parse failures
//! raised while loading raw configuration sources.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for operations that may fail with a svcboot error.
///
/// # Examples
///
/// ```
/// use svcboot::{Error, Result};
///
/// fn example_operation() -> Result<&'static str> {
///     Ok("ServiceManager")
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the svcboot library.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more definitions failed validation.
    ///
    /// Catalog and dependency-graph problems are collected and reported
    /// together through this variant.
    #[error("validation failed: {message}{}", render_errors(.errors))]
    Validation {
        /// Summary of the failed operation.
        message: String,
        /// Every field-tagged problem found.
        errors: Vec<ValidationError>,
    },

    /// A configuration scope could not satisfy the request.
    #[error("configuration error ({kind}): {message}")]
    Configuration {
        /// What went wrong.
        kind: ConfigErrorKind,
        /// Human readable details.
        message: String,
    },

    /// A service failed while being configured or initialized.
    #[error("failed to initialize service '{service}': {source}")]
    Initialization {
        /// Identifier of the offending service.
        service: String,
        /// The underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An unexpected, unrecoverable condition.
    #[error("internal error: {message}")]
    Internal {
        /// Details about the failure.
        message: String,
    },

    /// A raw configuration source could not be loaded.
    #[error("failed to load {}: {reason}", path.display())]
    Load {
        /// The source that failed.
        path: PathBuf,
        /// The reason loading failed.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML document could not be parsed or written.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Kinds of [`Error::Configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Required configuration is not present.
    Missing,
    /// The owning scope does not accept writes.
    ReadOnly,
    /// The scope cannot perform the requested operation.
    Unsupported,
    /// The configuration has an unexpected shape.
    Invalid,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::ReadOnly => write!(f, "read-only"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Category of a single validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    /// Generic failure.
    Failed,
    /// A required field is absent.
    Required,
    /// The value is outside the permitted set.
    ValueNotAllowed,
    /// The value has the wrong type.
    InvalidType,
    /// The value collides with an existing one.
    NotUnique,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "validation_failed"),
            Self::Required => write!(f, "required"),
            Self::ValueNotAllowed => write!(f, "value_not_allowed"),
            Self::InvalidType => write!(f, "invalid_data_type"),
            Self::NotUnique => write!(f, "unique"),
        }
    }
}

/// A single field-tagged validation problem.
///
/// # Examples
///
/// ```
/// use svcboot::error::{ValidationCode, ValidationError};
///
/// let err = ValidationError::new("services.cache.className", ValidationCode::Required, "missing");
/// assert_eq!(err.to_string(), "services.cache.className: missing (required)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Category of the problem.
    pub code: ValidationCode,
    /// Description of the problem.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(field: impl Into<String>, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.code)
    }
}

fn render_errors(errors: &[ValidationError]) -> String {
    errors.iter().fold(String::new(), |mut out, err| {
        out.push_str("\n  - ");
        out.push_str(&err.to_string());
        out
    })
}

impl Error {
    /// Builds a configuration error.
    pub fn configuration(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self::Configuration {
            kind,
            message: message.into(),
        }
    }

    /// Builds an aggregate validation error holding a single problem.
    pub fn validation(
        field: impl Into<String>,
        code: ValidationCode,
        message: impl Into<String>,
    ) -> Self {
        let err = ValidationError::new(field, code, message);
        Self::Validation {
            message: err.message.clone(),
            errors: vec![err],
        }
    }

    /// Wraps a hook failure as an initialization error for `service`.
    pub fn initialization(
        service: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Initialization {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Check if error is an aggregate validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if error is a configuration error of the given kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use svcboot::{ConfigErrorKind, Error};
    ///
    /// let err = Error::configuration(ConfigErrorKind::ReadOnly, "scope 'App' is read-only");
    /// assert!(err.is_configuration(ConfigErrorKind::ReadOnly));
    /// assert!(!err.is_configuration(ConfigErrorKind::Missing));
    /// ```
    #[must_use]
    pub fn is_configuration(&self, kind: ConfigErrorKind) -> bool {
        matches!(self, Self::Configuration { kind: k, .. } if *k == kind)
    }

    /// Returns the service identifier of an initialization error.
    #[must_use]
    pub fn failed_service(&self) -> Option<&str> {
        match self {
            Self::Initialization { service, .. } => Some(service),
            _ => None,
        }
    }

    /// Returns the field-tagged problems of a validation error.
    #[must_use]
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}
