//! Error types for configuration management

use ferromirror_types::Error as MirrorError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing a settings file
    #[error("I/O error on settings file '{path}': {source}")]
    Io {
        /// Path to the settings file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Settings validation error
    #[error("Settings validation failed: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// Connection settings that must be present are not
    #[error("Missing required settings: {}", .missing.join(", "))]
    Incomplete {
        /// Keys that are missing
        missing: Vec<String>,
    },

    /// Invalid value for a key
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Settings key
        key: String,
        /// Error message
        message: String,
    },

    /// Unknown settings key
    #[error("Unknown settings key: {key}")]
    UnknownKey {
        /// The key as given
        key: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Generic configuration error
    #[error("Configuration error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(error: config::ConfigError) -> Self {
        Self::Other {
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for MirrorError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Incomplete { missing } => MirrorError::ConfigIncomplete { missing },
            other => MirrorError::config(other.to_string()),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new invalid value error
    pub fn invalid_value<K: Into<String>, S: Into<String>>(key: K, message: S) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_maps_to_config_incomplete() {
        let error = ConfigError::Incomplete {
            missing: vec!["host".to_string()],
        };
        assert_eq!(
            MirrorError::from(error),
            MirrorError::ConfigIncomplete {
                missing: vec!["host".to_string()]
            }
        );
    }

    #[test]
    fn test_other_errors_map_to_config() {
        let error = ConfigError::validation("bad port");
        assert!(matches!(MirrorError::from(error), MirrorError::Config { .. }));
    }
}
