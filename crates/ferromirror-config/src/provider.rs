//! Key/value access to settings
//!
//! The engine only talks to settings through [`SettingsProvider`]. Keys use the
//! camelCase names users see in front ends; setting a key to `None` clears it
//! back to its default.

use crate::{ConfigError, ConfigLoader, ConfigResult, Settings};
use ferromirror_types::normalize_root;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Recognised settings keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// `protocol`: ftp, ftps or sftp
    Protocol,
    /// `host`
    Host,
    /// `port`
    Port,
    /// `username`
    Username,
    /// `password`
    Password,
    /// `remoteRoot`
    RemoteRoot,
    /// `syncOnConnect`
    SyncOnConnect,
    /// `syncExclude`
    SyncExclude,
    /// `skipUnchanged`
    SkipUnchanged,
}

impl SettingKey {
    /// Every key, in display order
    pub const ALL: [SettingKey; 9] = [
        Self::Protocol,
        Self::Host,
        Self::Port,
        Self::Username,
        Self::Password,
        Self::RemoteRoot,
        Self::SyncOnConnect,
        Self::SyncExclude,
        Self::SkipUnchanged,
    ];

    /// Keys cleared when a workspace is reset
    pub const CONNECTION: [SettingKey; 4] =
        [Self::Host, Self::Username, Self::Password, Self::RemoteRoot];

    /// User facing key name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Host => "host",
            Self::Port => "port",
            Self::Username => "username",
            Self::Password => "password",
            Self::RemoteRoot => "remoteRoot",
            Self::SyncOnConnect => "syncOnConnect",
            Self::SyncExclude => "syncExclude",
            Self::SkipUnchanged => "skipUnchanged",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().to_ascii_lowercase() == folded)
            .ok_or_else(|| ConfigError::UnknownKey { key: s.to_string() })
    }
}

/// A settings value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// String value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(u64),
    /// List of strings
    List(Vec<String>),
}

impl SettingValue {
    /// Parse command line input into the value type the key expects
    pub fn parse_for(key: SettingKey, input: &str) -> ConfigResult<Self> {
        match key {
            SettingKey::SyncOnConnect | SettingKey::SkipUnchanged => {
                match input.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Ok(Self::Bool(true)),
                    "false" | "no" | "off" | "0" => Ok(Self::Bool(false)),
                    _ => Err(ConfigError::invalid_value(key.as_str(), "expected a boolean")),
                }
            }
            SettingKey::Port => input
                .trim()
                .parse::<u64>()
                .map(Self::Number)
                .map_err(|_| ConfigError::invalid_value(key.as_str(), "expected a number")),
            SettingKey::SyncExclude => Ok(Self::List(
                input
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            _ => Ok(Self::Text(input.to_string())),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl Settings {
    /// Read one key. Unset optional keys yield `None`.
    pub fn get(&self, key: SettingKey) -> Option<SettingValue> {
        match key {
            SettingKey::Protocol => Some(SettingValue::Text(self.protocol.to_string())),
            SettingKey::Host => self.host.clone().map(SettingValue::Text),
            SettingKey::Port => self.port.map(|p| SettingValue::Number(u64::from(p))),
            SettingKey::Username => self.username.clone().map(SettingValue::Text),
            SettingKey::Password => self.password.clone().map(SettingValue::Text),
            SettingKey::RemoteRoot => Some(SettingValue::Text(self.remote_root.clone())),
            SettingKey::SyncOnConnect => Some(SettingValue::Bool(self.sync_on_connect)),
            SettingKey::SyncExclude => Some(SettingValue::List(self.sync_exclude.clone())),
            SettingKey::SkipUnchanged => Some(SettingValue::Bool(self.skip_unchanged)),
        }
    }

    /// Write one key; `None` restores the default
    pub fn set(&mut self, key: SettingKey, value: Option<SettingValue>) -> ConfigResult<()> {
        let defaults = Settings::default();
        let mismatch = |expected: &str| ConfigError::invalid_value(key.as_str(), format!("expected {expected}"));

        match (key, value) {
            (SettingKey::Protocol, None) => self.protocol = defaults.protocol,
            (SettingKey::Protocol, Some(SettingValue::Text(text))) => {
                self.protocol = text
                    .parse()
                    .map_err(|_| ConfigError::invalid_value(key.as_str(), format!("unknown protocol '{text}'")))?;
            }
            (SettingKey::Host, value) => self.host = optional_text(value).map_err(|_| mismatch("text"))?,
            (SettingKey::Username, value) => {
                self.username = optional_text(value).map_err(|_| mismatch("text"))?;
            }
            (SettingKey::Password, value) => {
                self.password = optional_text(value).map_err(|_| mismatch("text"))?;
            }
            (SettingKey::Port, None) => self.port = None,
            (SettingKey::Port, Some(SettingValue::Number(number))) => {
                let port = u16::try_from(number)
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| ConfigError::invalid_value(key.as_str(), "port must be between 1 and 65535"))?;
                self.port = Some(port);
            }
            (SettingKey::RemoteRoot, None) => self.remote_root = defaults.remote_root,
            (SettingKey::RemoteRoot, Some(SettingValue::Text(text))) => {
                self.remote_root = normalize_root(&text);
            }
            (SettingKey::SyncOnConnect, None) => self.sync_on_connect = defaults.sync_on_connect,
            (SettingKey::SyncOnConnect, Some(SettingValue::Bool(value))) => self.sync_on_connect = value,
            (SettingKey::SkipUnchanged, None) => self.skip_unchanged = defaults.skip_unchanged,
            (SettingKey::SkipUnchanged, Some(SettingValue::Bool(value))) => self.skip_unchanged = value,
            (SettingKey::SyncExclude, None) => self.sync_exclude = defaults.sync_exclude,
            (SettingKey::SyncExclude, Some(SettingValue::List(items))) => self.sync_exclude = items,
            (SettingKey::Protocol | SettingKey::RemoteRoot, Some(_)) => return Err(mismatch("text")),
            (SettingKey::Port, Some(_)) => return Err(mismatch("a number")),
            (SettingKey::SyncOnConnect | SettingKey::SkipUnchanged, Some(_)) => {
                return Err(mismatch("a boolean"));
            }
            (SettingKey::SyncExclude, Some(_)) => return Err(mismatch("a list")),
        }
        Ok(())
    }
}

fn optional_text(value: Option<SettingValue>) -> Result<Option<String>, ()> {
    match value {
        None => Ok(None),
        Some(SettingValue::Text(text)) => Ok(Some(text)),
        Some(_) => Err(()),
    }
}

/// Key/value settings store
pub trait SettingsProvider: Send + Sync {
    /// Read one key
    fn get(&self, key: SettingKey) -> Option<SettingValue>;

    /// Write one key; `None` clears it
    fn set(&self, key: SettingKey, value: Option<SettingValue>) -> ConfigResult<()>;

    /// Snapshot of all settings
    fn settings(&self) -> Settings;

    /// Forget host, credentials and remote root
    fn clear_connection(&self) -> ConfigResult<()> {
        for key in SettingKey::CONNECTION {
            self.set(key, None)?;
        }
        Ok(())
    }
}

/// Settings kept in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsProvider {
    settings: RwLock<Settings>,
}

impl MemorySettingsProvider {
    /// Wrap existing settings
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

impl SettingsProvider for MemorySettingsProvider {
    fn get(&self, key: SettingKey) -> Option<SettingValue> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    fn set(&self, key: SettingKey, value: Option<SettingValue>) -> ConfigResult<()> {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(key, value)
    }

    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Settings persisted to a file after every change
#[derive(Debug)]
pub struct FileSettingsProvider {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl FileSettingsProvider {
    /// Open a settings file, starting from defaults when it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            ConfigLoader::load_from_file(&path)?
        } else {
            debug!("Settings file {} not found, using defaults", path.display());
            Settings::default()
        };
        Ok(Self {
            path,
            settings: RwLock::new(settings),
        })
    }

    /// Open the workspace settings file, creating its name if none exists
    pub fn for_workspace(workspace_root: &Path) -> ConfigResult<Self> {
        let path = ConfigLoader::find_settings_file(workspace_root)
            .unwrap_or_else(|| workspace_root.join(crate::loader::DEFAULT_FILE_NAME));
        Self::open(path)
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn get(&self, key: SettingKey) -> Option<SettingValue> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    fn set(&self, key: SettingKey, value: Option<SettingValue>) -> ConfigResult<()> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = settings.clone();
        updated.set(key, value)?;
        ConfigLoader::save_to_file(&updated, &self.path)?;
        *settings = updated;
        debug!("Updated setting {} in {}", key, self.path.display());
        Ok(())
    }

    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferromirror_types::Protocol;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("remoteRoot", SettingKey::RemoteRoot)]
    #[case("remote_root", SettingKey::RemoteRoot)]
    #[case("sync-exclude", SettingKey::SyncExclude)]
    #[case("HOST", SettingKey::Host)]
    fn test_key_parsing(#[case] input: &str, #[case] expected: SettingKey) {
        assert_eq!(input.parse::<SettingKey>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_key() {
        assert!(matches!(
            "colour".parse::<SettingKey>(),
            Err(ConfigError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_value_parsing() {
        assert_eq!(
            SettingValue::parse_for(SettingKey::SyncOnConnect, "no").unwrap(),
            SettingValue::Bool(false)
        );
        assert_eq!(
            SettingValue::parse_for(SettingKey::SyncExclude, ".git, dist ,").unwrap(),
            SettingValue::List(vec![".git".to_string(), "dist".to_string()])
        );
        assert!(SettingValue::parse_for(SettingKey::Port, "abc").is_err());
    }

    #[test]
    fn test_memory_provider_set_and_clear() {
        let provider = MemorySettingsProvider::default();
        assert_eq!(provider.get(SettingKey::Host), None);
        assert_eq!(
            provider.get(SettingKey::RemoteRoot),
            Some(SettingValue::Text("/html".to_string()))
        );

        provider
            .set(SettingKey::Host, Some(SettingValue::Text("example.com".into())))
            .unwrap();
        provider
            .set(SettingKey::RemoteRoot, Some(SettingValue::Text("www/".into())))
            .unwrap();
        provider
            .set(SettingKey::Protocol, Some(SettingValue::Text("sftp".into())))
            .unwrap();
        assert_eq!(provider.settings().remote_root, "/www");
        assert_eq!(provider.settings().protocol, Protocol::Sftp);

        provider.clear_connection().unwrap();
        let settings = provider.settings();
        assert_eq!(settings.host, None);
        assert_eq!(settings.remote_root, "/html");
        // protocol is not a connection credential
        assert_eq!(settings.protocol, Protocol::Sftp);
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let provider = MemorySettingsProvider::default();
        assert!(provider
            .set(SettingKey::SyncOnConnect, Some(SettingValue::Text("yes".into())))
            .is_err());
        assert!(provider
            .set(SettingKey::Port, Some(SettingValue::Number(70000)))
            .is_err());
        assert!(provider
            .set(SettingKey::Protocol, Some(SettingValue::Text("gopher".into())))
            .is_err());
    }

    #[test]
    fn test_file_provider_persists() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSettingsProvider::for_workspace(temp_dir.path()).unwrap();
        provider
            .set(SettingKey::Username, Some(SettingValue::Text("deploy".into())))
            .unwrap();

        let reopened = FileSettingsProvider::for_workspace(temp_dir.path()).unwrap();
        assert_eq!(reopened.settings().username.as_deref(), Some("deploy"));
        assert!(reopened.path().ends_with(".ferromirror.toml"));
    }
}
