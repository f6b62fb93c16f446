//! Settings loader utilities

use crate::{ConfigBuilder, ConfigError, ConfigResult, Settings};
use std::path::{Path, PathBuf};

/// Environment prefix for settings overrides
pub const ENV_PREFIX: &str = "FERROMIRROR";

/// Settings file name used when a workspace has none yet
pub const DEFAULT_FILE_NAME: &str = ".ferromirror.toml";

/// Settings loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings for a workspace: first settings file found, then environment
    pub fn load_default(workspace_root: &Path) -> ConfigResult<Settings> {
        let mut builder = ConfigBuilder::new();
        if let Some(path) = Self::find_settings_file(workspace_root) {
            builder = builder.add_source_file(path);
        }
        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load settings from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Settings> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Settings file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Save settings, picking the format from the file extension
    pub fn save_to_file<P: AsRef<Path>>(settings: &Settings, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => serde_yaml::to_string(settings)?,
            Some("json") => {
                serde_json::to_string_pretty(settings).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to JSON: {}", e),
                })?
            }
            _ => toml::to_string_pretty(settings)?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// First existing settings file in the workspace root
    pub fn find_settings_file(workspace_root: &Path) -> Option<PathBuf> {
        Self::candidate_paths(workspace_root)
            .into_iter()
            .find(|path| path.exists())
    }

    /// Settings file locations in order of preference
    fn candidate_paths(workspace_root: &Path) -> Vec<PathBuf> {
        [
            ".ferromirror.toml",
            ".ferromirror.yaml",
            ".ferromirror.yml",
            ".ferromirror.json",
            "ferromirror.toml",
        ]
        .iter()
        .map(|name| workspace_root.join(name))
        .collect()
    }
}
