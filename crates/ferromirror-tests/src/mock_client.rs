//! Protocol client backed by a [`MockServer`]

use crate::mock_server::{tree, MockOp, MockServer};
use async_trait::async_trait;
use ferromirror_network::ClientFactory;
use ferromirror_types::{ConnectionConfig, Error, FileInfo, Protocol, ProtocolClient, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Client talking to an in-memory server
pub struct MockClient {
    server: MockServer,
    protocol: Protocol,
    connected: bool,
    cwd: String,
}

impl MockClient {
    /// Disconnected client for `server`
    pub fn new(server: MockServer, protocol: Protocol) -> Self {
        Self {
            server,
            protocol,
            connected: false,
            cwd: String::new(),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        let _call = self.server.enter(MockOp::Connect, &config.host).await?;
        self.connected = true;
        self.cwd = String::new();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            self.server.record_disconnect();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.ensure_connected()?;
        let contents = tokio::fs::read(local_path).await?;
        let _call = self.server.enter(MockOp::Upload, remote_path).await?;
        self.server
            .with_tree(|t| tree::write(t, remote_path, contents))
    }

    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.ensure_connected()?;
        let _call = self.server.enter(MockOp::Download, remote_path).await?;
        let contents = self.server.with_tree(|t| tree::read(t, remote_path))?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, contents).await?;
        Ok(())
    }

    async fn delete(&mut self, remote_path: &str) -> Result<()> {
        self.ensure_connected()?;
        let _call = self.server.enter(MockOp::Delete, remote_path).await?;
        self.server.with_tree(|t| tree::delete_file(t, remote_path))
    }

    async fn delete_empty_directory(&mut self, remote_path: &str) -> Result<()> {
        self.ensure_connected()?;
        let _call = self
            .server
            .enter(MockOp::DeleteEmptyDirectory, remote_path)
            .await?;
        self.server
            .with_tree(|t| tree::delete_empty_dir(t, remote_path))
    }

    async fn delete_directory(&mut self, remote_path: &str) -> Result<()> {
        self.ensure_connected()?;
        let _call = self
            .server
            .enter(MockOp::DeleteDirectory, remote_path)
            .await?;
        self.server.with_tree(|t| tree::delete_tree(t, remote_path))
    }

    async fn list(&mut self, remote_path: &str) -> Result<Vec<FileInfo>> {
        self.ensure_connected()?;
        let _call = self.server.enter(MockOp::List, remote_path).await?;
        self.server.with_tree(|t| tree::list(t, remote_path))
    }

    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        self.ensure_connected()?;
        let _call = self.server.enter(MockOp::Rename, old_path).await?;
        self.server
            .with_tree(|t| tree::rename(t, old_path, new_path))
    }

    async fn mkdir(&mut self, remote_path: &str) -> Result<()> {
        self.ensure_connected()?;
        let _call = self.server.enter(MockOp::Mkdir, remote_path).await?;
        self.server.with_tree(|t| tree::mkdir(t, remote_path))
    }

    async fn pwd(&mut self) -> Result<String> {
        self.ensure_connected()?;
        let _call = self.server.enter(MockOp::Pwd, &self.cwd).await?;
        Ok(format!("/{}", self.cwd))
    }

    async fn cd(&mut self, remote_path: &str) -> Result<()> {
        self.ensure_connected()?;
        if self.server.with_tree(|t| tree::is_dir(t, remote_path)) {
            self.cwd = remote_path.trim_matches('/').to_string();
            Ok(())
        } else {
            Err(Error::protocol(
                Some(550),
                format!("{remote_path}: No such directory"),
            ))
        }
    }
}

/// Factory handing out [`MockClient`]s for one server
pub struct MockClientFactory {
    server: MockServer,
    created: AtomicUsize,
}

impl MockClientFactory {
    /// Factory for `server`
    pub fn new(server: MockServer) -> Arc<Self> {
        Arc::new(Self {
            server,
            created: AtomicUsize::new(0),
        })
    }

    /// Clients created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, protocol: Protocol) -> Box<dyn ProtocolClient> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockClient::new(self.server.clone(), protocol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(Protocol::Ftp, "ftp.example.com", "deploy", "secret", "/html")
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut client = MockClient::new(MockServer::new(), Protocol::Ftp);
        assert_eq!(client.pwd().await.unwrap_err(), Error::NotConnected);
        assert_eq!(client.list("").await.unwrap_err(), Error::NotConnected);
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let server = MockServer::new().with_dir("site");
        let mut client = MockClient::new(server.clone(), Protocol::Sftp);
        client.connect(&config()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("index.html");
        tokio::fs::write(&local, b"<html>").await.unwrap();
        client.upload(&local, "site/index.html").await.unwrap();
        assert_eq!(server.file("site/index.html").unwrap(), b"<html>");

        let copy = dir.path().join("nested/copy.html");
        client.download("site/index.html", &copy).await.unwrap();
        assert_eq!(tokio::fs::read(&copy).await.unwrap(), b"<html>");
    }

    #[tokio::test]
    async fn test_upload_into_missing_directory_fails() {
        let server = MockServer::new();
        let mut client = MockClient::new(server, Protocol::Ftp);
        client.connect(&config()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.txt");
        tokio::fs::write(&local, b"a").await.unwrap();
        let err = client.upload(&local, "missing/a.txt").await.unwrap_err();
        assert!(matches!(err, Error::Protocol { code: Some(550), .. }));
    }

    #[test]
    fn test_factory_counts_clients() {
        let factory = MockClientFactory::new(MockServer::new());
        let client = factory.create(Protocol::Ftps);
        assert_eq!(client.protocol(), Protocol::Ftps);
        assert_eq!(factory.created(), 1);
    }
}
