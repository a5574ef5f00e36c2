//! Error types for loading, validating and persisting configuration.

use std::path::PathBuf;
use thiserror::Error;

use crate::schema::ValidationErrors;

/// Errors raised by a [`ConfigHandle`](crate::ConfigHandle) and its parts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An argument had the wrong shape (e.g. a payload that is not an object).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The configuration path has an extension other than `.json` or `.toml`.
    #[error("unsupported configuration file extension: {} (expected .json or .toml)", .0.display())]
    UnsupportedExtension(PathBuf),

    /// Malformed JSON in a configuration or schema file.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed TOML in a configuration file.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The payload cannot be represented as TOML.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The schema document is not usable.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// The payload does not satisfy the schema.
    #[error("validation failed with error(s):\n{0}")]
    Validation(ValidationErrors),

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {0}: the configuration has not been read")]
    Sequencing(&'static str),

    /// A field path could not be resolved for assignment.
    #[error("invalid field path: {0}")]
    Path(String),

    /// The file watcher could not be started.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A background operation was requested outside a tokio runtime.
    #[error("no tokio runtime available to schedule the operation")]
    NoRuntime,
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when this is an I/O error caused by a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let missing = ConfigError::io(
            "/tmp/nope.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(missing.is_not_found());

        let denied = ConfigError::io(
            "/tmp/nope.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!denied.is_not_found());
        assert!(!ConfigError::Sequencing("get").is_not_found());
    }

    #[test]
    fn test_sequencing_message() {
        let err = ConfigError::Sequencing("close");
        assert_eq!(err.to_string(), "cannot close: the configuration has not been read");
    }
}
