//! SFTP client on top of libssh2
//!
//! `ssh2` is a blocking library, so every call runs on the blocking pool with
//! the session behind a mutex. SFTP has no server-side working directory:
//! relative paths are resolved against the remote root, and `cd` only records
//! a logical directory after checking that it exists.

use crate::remote::{ancestors_below_root, full_path};
use async_trait::async_trait;
use chrono::DateTime;
use ferromirror_types::{
    ConnectionConfig, Error, FileInfo, FileKind, Protocol, ProtocolClient, Result, TimeoutConfig,
};
use ssh2::{ErrorCode, Session, Sftp};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

// libssh2 session error codes
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;
// SFTP status codes
const SSH_FX_NO_CONNECTION: i32 = 6;
const SSH_FX_CONNECTION_LOST: i32 = 7;

const DIRECTORY_MODE: i32 = 0o755;

struct SftpState {
    session: Session,
    sftp: Sftp,
    root: String,
    cwd: String,
}

impl SftpState {
    fn resolve(&self, path: &str) -> String {
        full_path(&self.root, path)
    }

    fn is_dir(&self, absolute: &str) -> bool {
        self.sftp
            .stat(Path::new(absolute))
            .is_ok_and(|stat| stat.is_dir())
    }

    fn remove_tree(&self, absolute: &str) -> Result<()> {
        let entries = self
            .sftp
            .readdir(Path::new(absolute))
            .map_err(|e| map_ssh_error(&format!("readdir {absolute}"), &e))?;
        for (path, stat) in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == "." || name == ".." {
                continue;
            }
            let child = full_path(absolute, name);
            if stat.is_dir() {
                self.remove_tree(&child)?;
            } else {
                self.sftp
                    .unlink(Path::new(&child))
                    .map_err(|e| map_ssh_error(&format!("unlink {child}"), &e))?;
            }
        }
        self.sftp
            .rmdir(Path::new(absolute))
            .map_err(|e| map_ssh_error(&format!("rmdir {absolute}"), &e))
    }
}

/// Translate a libssh2 failure into the shared error taxonomy
fn map_ssh_error(context: &str, error: &ssh2::Error) -> Error {
    match error.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT | LIBSSH2_ERROR_SOCKET_TIMEOUT) => Error::Timeout {
            message: format!("{context}: {error}"),
        },
        ErrorCode::Session(LIBSSH2_ERROR_SOCKET_SEND | LIBSSH2_ERROR_SOCKET_RECV) => {
            Error::network(format!("{context}: connection reset: {error}"))
        }
        ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT)
        | ErrorCode::SFTP(SSH_FX_NO_CONNECTION | SSH_FX_CONNECTION_LOST) => {
            Error::network(format!("{context}: connection closed: {error}"))
        }
        ErrorCode::SFTP(code) => Error::protocol(u32::try_from(code).ok(), format!("{context}: {error}")),
        ErrorCode::Session(_) => Error::network(format!("{context}: {error}")),
    }
}

/// SFTP client with password authentication
pub struct SftpClient {
    timeouts: TimeoutConfig,
    state: Option<Arc<Mutex<SftpState>>>,
}

impl SftpClient {
    /// Create a disconnected client
    pub fn new() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            state: None,
        }
    }

    /// Override transport timeouts
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run `op` against the session on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SftpState) -> Result<T> + Send + 'static,
    {
        let state = self.state.clone().ok_or(Error::NotConnected)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut guard)
        })
        .await
        .map_err(|e| Error::other(format!("SFTP worker failed: {e}")))?
    }

    fn open_session(config: &ConnectionConfig, timeouts: TimeoutConfig) -> Result<SftpState> {
        let address = config.address();
        let socket_addr = address
            .to_socket_addrs()
            .map_err(|e| Error::connection(format!("Could not resolve {address}: {e}")))?
            .next()
            .ok_or_else(|| Error::connection(format!("No address found for {address}")))?;
        let tcp = TcpStream::connect_timeout(&socket_addr, timeouts.connect_timeout)
            .map_err(|e| Error::connection(format!("Could not reach {address}: {e}")))?;

        let mut session = Session::new()
            .map_err(|e| Error::connection(format!("Failed to create SSH session: {e}")))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(timeouts.connect_timeout.as_millis()).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|e| Error::connection(format!("SSH handshake failed: {e}")))?;
        session
            .userauth_password(&config.username, &config.password)
            .map_err(|e| Error::connection(format!("Login failed: {e}")))?;
        if !session.authenticated() {
            return Err(Error::connection("Login failed: server did not accept the password"));
        }
        // Only the handshake is bounded; transfers run as long as they need
        session.set_timeout(0);

        let sftp = session
            .sftp()
            .map_err(|e| Error::connection(format!("SFTP subsystem unavailable: {e}")))?;
        let state = SftpState {
            session,
            sftp,
            root: config.remote_root.clone(),
            cwd: config.remote_root.clone(),
        };
        if !state.is_dir(&state.root) {
            return Err(Error::connection(format!(
                "Remote root {} is not accessible",
                config.remote_root
            )));
        }
        Ok(state)
    }
}

impl Default for SftpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for SftpClient {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        if self.state.is_some() {
            self.disconnect().await?;
        }
        let owned = config.clone();
        let timeouts = self.timeouts;
        // A failed handshake drops the session and socket on the worker thread
        let state = tokio::task::spawn_blocking(move || Self::open_session(&owned, timeouts))
            .await
            .map_err(|e| Error::connection(format!("SFTP worker failed: {e}")))??;
        info!("Connected to {} as {}", config.address(), config.username);
        self.state = Some(Arc::new(Mutex::new(state)));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let closed = tokio::task::spawn_blocking(move || {
            let guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            guard.session.disconnect(None, "closing", None)
        })
        .await;
        if let Ok(Err(e)) = closed {
            debug!("SSH disconnect failed, dropping session anyway: {}", e);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let local = local_path.to_path_buf();
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            let mut source = std::fs::File::open(&local)?;
            let mut sink = state
                .sftp
                .create(Path::new(&target))
                .map_err(|e| map_ssh_error(&format!("create {target}"), &e))?;
            let sent = io::copy(&mut source, &mut sink)?;
            debug!("Stored {} ({} bytes)", target, sent);
            Ok(())
        })
        .await
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<()> {
        let local: PathBuf = local_path.to_path_buf();
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let source_path = state.resolve(&remote);
            let mut source = state
                .sftp
                .open(Path::new(&source_path))
                .map_err(|e| map_ssh_error(&format!("open {source_path}"), &e))?;
            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut sink = std::fs::File::create(&local)?;
            let received = io::copy(&mut source, &mut sink)?;
            debug!("Retrieved {} ({} bytes)", source_path, received);
            Ok(())
        })
        .await
    }

    async fn delete(&mut self, remote_path: &str) -> Result<()> {
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            state
                .sftp
                .unlink(Path::new(&target))
                .map_err(|e| map_ssh_error(&format!("unlink {target}"), &e))
        })
        .await
    }

    async fn delete_empty_directory(&mut self, remote_path: &str) -> Result<()> {
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            state
                .sftp
                .rmdir(Path::new(&target))
                .map_err(|e| map_ssh_error(&format!("rmdir {target}"), &e))
        })
        .await
    }

    async fn delete_directory(&mut self, remote_path: &str) -> Result<()> {
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            if target == state.root || target == "/" {
                return Err(Error::other(format!("Refusing to delete {target}")));
            }
            state.remove_tree(&target)
        })
        .await
    }

    async fn list(&mut self, remote_path: &str) -> Result<Vec<FileInfo>> {
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            let entries = state
                .sftp
                .readdir(Path::new(&target))
                .map_err(|e| map_ssh_error(&format!("readdir {target}"), &e))?;
            Ok(entries
                .into_iter()
                .filter_map(|(path, stat)| {
                    let name = path.file_name()?.to_str()?.to_string();
                    Some(FileInfo {
                        name,
                        kind: if stat.is_dir() {
                            FileKind::Directory
                        } else {
                            FileKind::File
                        },
                        size: if stat.is_dir() { 0 } else { stat.size.unwrap_or(0) },
                        modified_at: stat
                            .mtime
                            .and_then(|secs| DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)),
                    })
                })
                .filter(|entry| !entry.is_navigation())
                .collect())
        })
        .await
    }

    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        let old = old_path.to_string();
        let new = new_path.to_string();
        self.blocking(move |state| {
            let from = state.resolve(&old);
            let to = state.resolve(&new);
            state
                .sftp
                .rename(Path::new(&from), Path::new(&to), None)
                .map_err(|e| map_ssh_error(&format!("rename {from} -> {to}"), &e))
        })
        .await
    }

    async fn mkdir(&mut self, remote_path: &str) -> Result<()> {
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            for directory in ancestors_below_root(&state.root, &target) {
                if state.is_dir(&directory) {
                    continue;
                }
                if let Err(e) = state.sftp.mkdir(Path::new(&directory), DIRECTORY_MODE) {
                    // Lost a race with another client, still fine
                    if state.is_dir(&directory) {
                        continue;
                    }
                    return Err(map_ssh_error(&format!("mkdir {directory}"), &e));
                }
            }
            Ok(())
        })
        .await
    }

    async fn pwd(&mut self) -> Result<String> {
        // realpath is a full round trip, which makes pwd usable as a liveness probe
        self.blocking(|state| {
            let resolved = state
                .sftp
                .realpath(Path::new(&state.cwd))
                .map_err(|e| map_ssh_error("realpath", &e))?;
            Ok(resolved.to_string_lossy().into_owned())
        })
        .await
    }

    async fn cd(&mut self, remote_path: &str) -> Result<()> {
        let remote = remote_path.to_string();
        self.blocking(move |state| {
            let target = state.resolve(&remote);
            let stat = state
                .sftp
                .stat(Path::new(&target))
                .map_err(|e| map_ssh_error(&format!("stat {target}"), &e))?;
            if !stat.is_dir() {
                return Err(Error::protocol(None, format!("{target} is not a directory")));
            }
            state.cwd = target;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferromirror_types::TransientCause;
    use rstest::rstest;
    use std::time::Duration;

    #[tokio::test]
    async fn test_operations_require_session() {
        let mut client = SftpClient::new();
        assert!(!client.is_connected());
        assert_eq!(client.protocol(), Protocol::Sftp);
        assert_eq!(client.pwd().await, Err(Error::NotConnected));
        assert_eq!(client.cd("a").await, Err(Error::NotConnected));
        assert_eq!(client.delete("a.txt").await, Err(Error::NotConnected));
        assert!(client.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_leaves_no_session() -> Result<()> {
        let port = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await?
            .local_addr()?
            .port();
        let mut client = SftpClient::new().with_timeouts(TimeoutConfig {
            connect_timeout: Duration::from_secs(2),
        });
        let config =
            ConnectionConfig::new(Protocol::Sftp, "127.0.0.1", "deploy", "secret", "/html").with_port(port);
        let err = client.connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(!client.is_connected());
        Ok(())
    }

    #[rstest]
    #[case(ErrorCode::Session(LIBSSH2_ERROR_SOCKET_RECV), Some(TransientCause::Reset))]
    #[case(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT), Some(TransientCause::Timeout))]
    #[case(ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT), Some(TransientCause::HangUp))]
    #[case(ErrorCode::SFTP(SSH_FX_CONNECTION_LOST), Some(TransientCause::HangUp))]
    #[case(ErrorCode::SFTP(2), None)]
    #[case(ErrorCode::SFTP(3), None)]
    fn test_ssh_error_classification(#[case] code: ErrorCode, #[case] expected: Option<TransientCause>) {
        let error = ssh2::Error::new(code, "boom");
        assert_eq!(map_ssh_error("op", &error).transient_cause(), expected);
    }
}
