//! Settings management for FerroMirror
//!
//! This crate owns everything the engine needs to know before it can open a
//! session: connection settings, sync behaviour, retry policy and logging
//! options.
//!
//! # Features
//!
//! - **Layered loading**: defaults, then a settings file (TOML, YAML or JSON), then
//!   `FERROMIRROR__*` environment variables
//! - **Validation**: host, port and remote path checks before anything connects
//! - **Settings providers**: key/value access with in-memory and file-backed stores
//!
//! # Examples
//!
//! ```rust
//! use ferromirror_config::{MemorySettingsProvider, SettingKey, SettingValue, SettingsProvider};
//!
//! let provider = MemorySettingsProvider::default();
//! provider
//!     .set(SettingKey::Host, Some(SettingValue::Text("ftp.example.com".into())))
//!     .unwrap();
//! assert_eq!(provider.settings().remote_root, "/html");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use ferromirror_types::{ConnectionConfig, Protocol, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;
pub mod provider;
pub mod validate;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use provider::{
    FileSettingsProvider, MemorySettingsProvider, SettingKey, SettingValue, SettingsProvider,
};

/// Remote root used when none is configured
pub const DEFAULT_REMOTE_ROOT: &str = "/html";

/// Patterns excluded from initial sync unless configured otherwise
pub const DEFAULT_SYNC_EXCLUDE: &[&str] = &[".git", "node_modules"];

/// Complete settings for one workspace
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wire protocol
    pub protocol: Protocol,
    /// Server host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Explicit port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Login name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Absolute remote directory mirroring the workspace root
    pub remote_root: String,
    /// Pull the remote tree after a successful setup
    pub sync_on_connect: bool,
    /// Glob patterns skipped by initial sync and directory push
    pub sync_exclude: Vec<String>,
    /// Skip downloads whose local copy already has the remote size
    pub skip_unchanged: bool,
    /// Retry behaviour of the transfer queue
    pub retry: RetrySettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: None,
            port: None,
            username: None,
            password: None,
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            sync_on_connect: true,
            sync_exclude: DEFAULT_SYNC_EXCLUDE.iter().map(|s| (*s).to_string()).collect(),
            skip_unchanged: false,
            retry: RetrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("remote_root", &self.remote_root)
            .field("sync_on_connect", &self.sync_on_connect)
            .field("sync_exclude", &self.sync_exclude)
            .field("skip_unchanged", &self.skip_unchanged)
            .field("retry", &self.retry)
            .field("logging", &self.logging)
            .finish()
    }
}

impl Settings {
    /// Build the connection config, listing every missing field on failure
    pub fn connection_config(&self) -> ConfigResult<ConnectionConfig> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let host = present(&self.host);
        let username = present(&self.username);
        // Passwords are taken verbatim; only absence counts as missing.
        let password = self.password.clone().filter(|p| !p.is_empty());

        let mut missing = Vec::new();
        if host.is_none() {
            missing.push(SettingKey::Host.as_str().to_string());
        }
        if username.is_none() {
            missing.push(SettingKey::Username.as_str().to_string());
        }
        if password.is_none() {
            missing.push(SettingKey::Password.as_str().to_string());
        }

        match (host, username, password) {
            (Some(host), Some(username), Some(password)) => {
                let mut config =
                    ConnectionConfig::new(self.protocol, host, username, password, &self.remote_root);
                config.port = self.port;
                Ok(config)
            }
            _ => Err(ConfigError::Incomplete { missing }),
        }
    }

    /// Whether host and credentials are all present
    pub fn is_complete(&self) -> bool {
        self.connection_config().is_ok()
    }

    /// Retry policy for the transfer queue
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    /// Validate present values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(host) = &self.host {
            if !validate::validate_host(host) {
                return Err(ConfigError::invalid_value(
                    SettingKey::Host.as_str(),
                    format!("'{host}' is not an IPv4 address or domain name"),
                ));
            }
        }
        if let Some(port) = self.port {
            if !validate::validate_port(u32::from(port)) {
                return Err(ConfigError::invalid_value(
                    SettingKey::Port.as_str(),
                    "port must be between 1 and 65535",
                ));
            }
        }
        if !validate::validate_remote_path(&self.remote_root) {
            return Err(ConfigError::invalid_value(
                SettingKey::RemoteRoot.as_str(),
                format!(
                    "'{}' must be absolute and free of < > : \" | ? *",
                    self.remote_root
                ),
            ));
        }
        if self.retry.max_retries > RetrySettings::MAX_RETRIES {
            return Err(ConfigError::validation(format!(
                "retry.max_retries must be at most {}",
                RetrySettings::MAX_RETRIES
            )));
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }
}

/// Retry settings for queued transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before each retry in milliseconds
    pub delay_ms: u64,
}

impl RetrySettings {
    /// Upper bound accepted by validation
    pub const MAX_RETRIES: u32 = 10;
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            delay_ms: RetryPolicy::DEFAULT_DELAY.as_millis() as u64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log file path, stderr only when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Settings {
        Settings {
            host: Some("ftp.example.com".to_string()),
            username: Some("deploy".to_string()),
            password: Some("secret".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.protocol, Protocol::Ftp);
        assert_eq!(settings.remote_root, "/html");
        assert!(settings.sync_on_connect);
        assert_eq!(settings.sync_exclude, vec![".git", "node_modules"]);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_connection_config_lists_missing_fields() {
        let settings = Settings {
            host: Some("  ".to_string()),
            ..Settings::default()
        };
        match settings.connection_config() {
            Err(ConfigError::Incomplete { missing }) => {
                assert_eq!(missing, vec!["host", "username", "password"]);
            }
            other => panic!("expected incomplete settings, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_config_complete() {
        let mut settings = complete();
        settings.protocol = Protocol::Sftp;
        settings.port = Some(2222);
        settings.remote_root = "var/www/".to_string();

        let config = settings.connection_config().unwrap();
        assert_eq!(config.protocol, Protocol::Sftp);
        assert_eq!(config.effective_port(), 2222);
        assert_eq!(config.remote_root, "/var/www");
        assert!(settings.is_complete());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = complete();
        settings.host = Some("ftp server".to_string());
        assert!(settings.validate().is_err());

        let mut settings = complete();
        settings.remote_root = "/path?".to_string();
        assert!(settings.validate().is_err());

        let mut settings = complete();
        settings.port = Some(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains("secret"));
    }
}
