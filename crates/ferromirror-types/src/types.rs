//! Core data types for FerroMirror

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Wire protocol used to reach the remote server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain FTP
    #[default]
    Ftp,
    /// FTP with explicit TLS on control and data channels
    Ftps,
    /// SSH file transfer protocol
    Sftp,
}

impl Protocol {
    /// Port used when the configuration does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ftp | Self::Ftps => 21,
            Self::Sftp => 22,
        }
    }

    /// Lowercase protocol tag
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ftp => "ftp",
            Self::Ftps => "ftps",
            Self::Sftp => "sftp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ftp" => Ok(Self::Ftp),
            "ftps" => Ok(Self::Ftps),
            "sftp" => Ok(Self::Sftp),
            other => Err(Error::config(format!("unknown protocol '{other}'"))),
        }
    }
}

/// Everything needed to open one session
///
/// A config is fixed for the lifetime of a session; changing any field
/// requires a full reconnect.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Wire protocol
    pub protocol: Protocol,
    /// Server host name or address
    pub host: String,
    /// Explicit port, protocol default when absent
    pub port: Option<u16>,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
    /// Absolute remote directory that mirrors the workspace root
    pub remote_root: String,
}

impl ConnectionConfig {
    /// Create a config with the protocol default port
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            remote_root: normalize_root(&remote_root.into()),
        }
    }

    /// Set an explicit port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Port that will actually be dialled
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// `host:port` for socket addressing
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.effective_port())
    }
}

// Passwords stay out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("remote_root", &self.remote_root)
            .finish()
    }
}

/// Force a remote root to be absolute without a trailing slash
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Kind of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Regular file (symlinks and unknown entries are reported as files)
    File,
    /// Directory
    Directory,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Entry name, without any directory part
    pub name: String,
    /// Entry kind
    pub kind: FileKind,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, when the server reports one
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// Create a file entry
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::File,
            size,
            modified_at: None,
        }
    }

    /// Create a directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::Directory,
            size: 0,
            modified_at: None,
        }
    }

    /// Check if the entry is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// `.` and `..` never leave a protocol client
    pub fn is_navigation(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Recursively collected remote tree
///
/// Directories are in pre-order, so every directory appears before anything
/// inside it. Paths are relative to the listing start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifest {
    /// Remote file paths
    pub files: Vec<String>,
    /// Remote directory paths, parents first
    pub directories: Vec<String>,
    /// File sizes reported by the listing
    pub sizes: BTreeMap<String, u64>,
    /// Directories whose listing failed below the top level
    pub unreadable: Vec<String>,
}

impl RemoteManifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file
    pub fn push_file(&mut self, path: impl Into<String>, size: u64) {
        let path = path.into();
        self.sizes.insert(path.clone(), size);
        self.files.push(path);
    }

    /// Record a directory
    pub fn push_directory(&mut self, path: impl Into<String>) {
        self.directories.push(path.into());
    }

    /// Append another manifest, keeping order
    pub fn merge(&mut self, other: RemoteManifest) {
        self.files.extend(other.files);
        self.directories.extend(other.directories);
        self.sizes.extend(other.sizes);
        self.unreadable.extend(other.unreadable);
    }

    /// Number of directories plus files
    pub fn total(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    /// Check if nothing was found
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One progress tick of a long running operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Items handled so far
    pub processed: u64,
    /// Items expected in total
    pub total: u64,
    /// Short description of the current item
    pub message: String,
}

impl ProgressUpdate {
    /// Create a progress update
    pub fn new(processed: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            processed,
            total,
            message: message.into(),
        }
    }

    /// Completion as a percentage, 100 for an empty run
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ftp", Protocol::Ftp, 21)]
    #[case("FTPS", Protocol::Ftps, 21)]
    #[case(" sftp ", Protocol::Sftp, 22)]
    fn test_protocol_parse(#[case] input: &str, #[case] expected: Protocol, #[case] port: u16) {
        let protocol: Protocol = input.parse().unwrap();
        assert_eq!(protocol, expected);
        assert_eq!(protocol.default_port(), port);
    }

    #[test]
    fn test_protocol_parse_rejects_unknown() {
        assert!("scp".parse::<Protocol>().is_err());
    }

    #[rstest]
    #[case("html", "/html")]
    #[case("/html/", "/html")]
    #[case("", "/")]
    #[case("/", "/")]
    #[case("/var/www", "/var/www")]
    fn test_normalize_root(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_root(input), expected);
    }

    #[test]
    fn test_connection_config_debug_hides_password() {
        let config = ConnectionConfig::new(Protocol::Sftp, "example.com", "me", "hunter2", "/html");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(config.address(), "example.com:22");
        assert_eq!(config.with_port(2222).effective_port(), 2222);
    }

    #[test]
    fn test_manifest_merge_keeps_order() {
        let mut root = RemoteManifest::new();
        root.push_directory("a");
        let mut sub = RemoteManifest::new();
        sub.push_directory("a/b");
        sub.push_file("a/b/c.txt", 3);
        root.merge(sub);
        root.push_file("d.txt", 1);

        assert_eq!(root.directories, vec!["a", "a/b"]);
        assert_eq!(root.files, vec!["a/b/c.txt", "d.txt"]);
        assert_eq!(root.sizes.get("a/b/c.txt"), Some(&3));
        assert_eq!(root.total(), 4);
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(ProgressUpdate::new(0, 0, "").percentage(), 100.0);
        assert_eq!(ProgressUpdate::new(1, 4, "").percentage(), 25.0);
    }
}
