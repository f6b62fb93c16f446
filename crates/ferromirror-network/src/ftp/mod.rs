//! FTP and explicit-TLS FTPS client
//!
//! A session is one control connection. Transfers and listings open a fresh
//! passive data connection per command. The control connection has a single
//! working-directory cursor, so operations that depend on it first return to
//! the remote root.

pub mod control;
pub mod data;
pub mod listing;
pub mod stream;

use crate::remote::{ancestors_below_root, full_path};
use async_trait::async_trait;
use control::{parse_pwd, ControlChannel};
use ferromirror_types::{
    ConnectionConfig, Error, FileInfo, Protocol, ProtocolClient, Result, TimeoutConfig,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::Path;
use stream::{FtpStream, TlsSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

struct Session {
    control: ControlChannel,
    tls: Option<TlsSettings>,
    root: String,
    mlsd: bool,
}

impl Session {
    fn resolve(&self, path: &str) -> String {
        full_path(&self.root, path)
    }

    async fn cwd(&mut self, absolute: &str) -> Result<()> {
        self.control.expect_ok(&format!("CWD {absolute}")).await?;
        Ok(())
    }

    async fn cwd_root(&mut self) -> Result<()> {
        let root = self.root.clone();
        self.cwd(&root).await
    }

    /// Open a data connection and issue a command that uses it
    async fn start_transfer(&mut self, command: &str) -> Result<FtpStream> {
        let data = data::open_data_stream(&mut self.control, self.tls.as_ref()).await?;
        let reply = self.control.execute(command).await?;
        if reply.is_preliminary() {
            Ok(data)
        } else {
            Err(reply.into_error())
        }
    }

    /// Wait for the 226 that follows a closed data connection
    async fn finish_transfer(&mut self) -> Result<()> {
        let reply = self.control.read_reply().await?;
        if reply.is_completion() {
            Ok(())
        } else {
            Err(reply.into_error())
        }
    }

    async fn list(&mut self, absolute: &str) -> Result<Vec<FileInfo>> {
        let command = if self.mlsd {
            format!("MLSD {absolute}")
        } else {
            format!("LIST {absolute}")
        };
        let mut data = self.start_transfer(&command).await?;
        let mut raw = Vec::new();
        let read = data.read_to_end(&mut raw).await;
        drop(data);
        self.finish_transfer().await?;
        read?;
        Ok(listing::parse_listing(&String::from_utf8_lossy(&raw)))
    }

    fn remove_tree(&mut self, absolute: String) -> BoxFuture<'_, Result<()>> {
        async move {
            for entry in self.list(&absolute).await? {
                let child = full_path(&absolute, &entry.name);
                if entry.is_dir() {
                    self.remove_tree(child).await?;
                } else {
                    self.control.expect_ok(&format!("DELE {child}")).await?;
                }
            }
            self.control.expect_ok(&format!("RMD {absolute}")).await?;
            Ok(())
        }
        .boxed()
    }
}

/// FTP client, optionally upgraded to TLS with `AUTH TLS`
pub struct FtpClient {
    secure: bool,
    timeouts: TimeoutConfig,
    session: Option<Session>,
}

impl FtpClient {
    /// Plain FTP client
    pub fn new() -> Self {
        Self {
            secure: false,
            timeouts: TimeoutConfig::default(),
            session: None,
        }
    }

    /// FTPS client with explicit TLS on control and data channels
    pub fn secure() -> Self {
        Self {
            secure: true,
            ..Self::new()
        }
    }

    /// Override transport timeouts
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(Error::NotConnected)
    }

    /// Read the completion reply of a transfer the server has accepted
    ///
    /// A local failure during the copy still waits for that reply, so the
    /// control channel stays in step. When the reply cannot be read the
    /// session is dropped and the next operation reconnects.
    async fn settle_transfer(&mut self, copied: Result<u64>) -> Result<u64> {
        let session = self.session()?;
        let read = session.control.read_reply().await;
        let reply = match read {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Lost the control channel after a transfer: {}", e);
                self.session = None;
                return Err(copied.err().unwrap_or(e));
            }
        };
        let bytes = copied?;
        if reply.is_completion() {
            Ok(bytes)
        } else {
            Err(reply.into_error())
        }
    }

    async fn open_session(&self, config: &ConnectionConfig) -> Result<Session> {
        let address = config.address();
        debug!("Connecting to {} ({})", address, config.protocol);
        let tcp = tokio::time::timeout(self.timeouts.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| Error::connection(format!("Timed out connecting to {address}")))?
            .map_err(|e| Error::connection(format!("Could not reach {address}: {e}")))?;

        let mut control = ControlChannel::new(FtpStream::Plain(tcp));
        let mut banner = control.read_reply().await?;
        while banner.is_preliminary() {
            banner = control.read_reply().await?;
        }
        if banner.code != 220 {
            return Err(Error::connection(format!(
                "Unexpected greeting: {} {}",
                banner.code,
                banner.text()
            )));
        }

        let tls = if self.secure {
            let tls = TlsSettings::new(&config.host)?;
            let reply = control.execute("AUTH TLS").await?;
            if reply.code != 234 {
                return Err(Error::connection(format!(
                    "Server refused AUTH TLS: {} {}",
                    reply.code,
                    reply.text()
                )));
            }
            control = control.upgrade(&tls).await?;
            Some(tls)
        } else {
            None
        };

        let reply = control.execute(&format!("USER {}", config.username)).await?;
        let reply = if reply.is_intermediate() {
            control.execute(&format!("PASS {}", config.password)).await?
        } else {
            reply
        };
        if !reply.is_completion() {
            return Err(Error::connection(format!("Login failed: {}", reply.text())));
        }

        if tls.is_some() {
            control.expect_ok("PBSZ 0").await?;
            control.expect_ok("PROT P").await?;
        }
        control.expect_ok("TYPE I").await?;

        let features = control.execute("FEAT").await?;
        let mlsd = features.is_completion()
            && features
                .lines
                .iter()
                .any(|line| line.trim().to_ascii_uppercase().starts_with("MLSD"));
        trace!("MLSD supported: {}", mlsd);

        let mut session = Session {
            control,
            tls,
            root: config.remote_root.clone(),
            mlsd,
        };
        session.cwd_root().await.map_err(|e| {
            Error::connection(format!("Remote root {} is not accessible: {e}", config.remote_root))
        })?;
        Ok(session)
    }
}

impl Default for FtpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for FtpClient {
    fn protocol(&self) -> Protocol {
        if self.secure {
            Protocol::Ftps
        } else {
            Protocol::Ftp
        }
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        if self.session.is_some() {
            self.disconnect().await?;
        }
        // Dropping a half-built session closes its socket
        let session = self.open_session(config).await?;
        info!("Connected to {} as {}", config.address(), config.username);
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.control.execute("QUIT").await {
                debug!("QUIT failed, dropping session anyway: {}", e);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        let session = self.session()?;
        session.cwd_root().await?;
        let target = session.resolve(remote_path);

        let mut file = tokio::fs::File::open(local_path).await?;
        let mut data = session.start_transfer(&format!("STOR {target}")).await?;
        let copied = async {
            let sent = tokio::io::copy(&mut file, &mut data).await?;
            data.shutdown().await?;
            Ok::<_, Error>(sent)
        }
        .await;
        drop(data);
        let sent = self.settle_transfer(copied).await?;
        debug!("Stored {} ({} bytes)", target, sent);
        Ok(())
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<()> {
        let session = self.session()?;
        let source = session.resolve(remote_path);
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Created before RETR so a bad local path never strands a transfer
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut data = session.start_transfer(&format!("RETR {source}")).await?;
        let copied = async {
            let received = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            Ok::<_, Error>(received)
        }
        .await;
        drop(data);
        let received = self.settle_transfer(copied).await?;
        debug!("Retrieved {} ({} bytes)", source, received);
        Ok(())
    }

    async fn delete(&mut self, remote_path: &str) -> Result<()> {
        let session = self.session()?;
        let target = session.resolve(remote_path);
        session.control.expect_ok(&format!("DELE {target}")).await?;
        Ok(())
    }

    async fn delete_empty_directory(&mut self, remote_path: &str) -> Result<()> {
        let session = self.session()?;
        let target = session.resolve(remote_path);
        session.control.expect_ok(&format!("RMD {target}")).await?;
        Ok(())
    }

    async fn delete_directory(&mut self, remote_path: &str) -> Result<()> {
        let session = self.session()?;
        let target = session.resolve(remote_path);
        if target == session.root || target == "/" {
            return Err(Error::other(format!("Refusing to delete {target}")));
        }
        session.remove_tree(target).await
    }

    async fn list(&mut self, remote_path: &str) -> Result<Vec<FileInfo>> {
        let session = self.session()?;
        let target = session.resolve(remote_path);
        session.list(&target).await
    }

    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        let session = self.session()?;
        let from = session.resolve(old_path);
        let to = session.resolve(new_path);

        let reply = session.control.execute(&format!("RNFR {from}")).await?;
        if !reply.is_intermediate() {
            return Err(reply.into_error());
        }
        session.control.expect_ok(&format!("RNTO {to}")).await?;
        Ok(())
    }

    async fn mkdir(&mut self, remote_path: &str) -> Result<()> {
        let session = self.session()?;
        session.cwd_root().await?;
        let target = session.resolve(remote_path);

        let mut result = Ok(());
        for directory in ancestors_below_root(&session.root, &target) {
            let reply = session.control.execute(&format!("MKD {directory}")).await?;
            if reply.is_completion() {
                continue;
            }
            // Servers report an existing directory with a generic 550
            if session.cwd(&directory).await.is_ok() {
                continue;
            }
            warn!("Could not create {}: {} {}", directory, reply.code, reply.text());
            result = Err(reply.into_error());
            break;
        }

        session.cwd_root().await?;
        result
    }

    async fn pwd(&mut self) -> Result<String> {
        let session = self.session()?;
        let reply = session.control.expect_ok("PWD").await?;
        parse_pwd(&reply.text())
            .ok_or_else(|| Error::protocol(Some(reply.code), format!("unparsable PWD reply: {}", reply.text())))
    }

    async fn cd(&mut self, remote_path: &str) -> Result<()> {
        let session = self.session()?;
        let target = session.resolve(remote_path);
        session.cwd(&target).await
    }
}
