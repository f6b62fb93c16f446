//! Shared setup for engine level tests

use crate::mock_client::MockClientFactory;
use crate::mock_server::MockServer;
use crate::recording::{MemoryLogger, RecordingNotifier};
use ferromirror_config::{MemorySettingsProvider, Settings, SettingsProvider};
use ferromirror_engine::SyncEngine;
use ferromirror_types::{Protocol, Result, RetryPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Retry delay used by tests; short so retry paths stay fast
pub const TEST_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Settings with host and credentials filled in
pub fn complete_settings() -> Settings {
    Settings {
        protocol: Protocol::Ftp,
        host: Some("ftp.example.com".to_string()),
        username: Some("deploy".to_string()),
        password: Some("secret".to_string()),
        sync_on_connect: false,
        ..Settings::default()
    }
}

/// Write `contents` to `root/relative`, creating parents
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// An engine wired to a mock server, with recording collaborators
pub struct Harness {
    /// Workspace directory
    pub workspace: TempDir,
    /// Remote side
    pub server: MockServer,
    /// Client factory handed to the engine
    pub factory: Arc<MockClientFactory>,
    /// Settings store
    pub settings: Arc<MemorySettingsProvider>,
    /// Notifications
    pub notifier: Arc<RecordingNotifier>,
    /// Output log
    pub logger: Arc<MemoryLogger>,
    /// Engine under test
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    /// Engine with complete settings, not yet connected
    pub async fn new(server: MockServer) -> Self {
        Self::with_settings(server, complete_settings(), RecordingNotifier::new()).await
    }

    /// Engine with custom settings and notifier
    pub async fn with_settings(
        server: MockServer,
        settings: Settings,
        notifier: Arc<RecordingNotifier>,
    ) -> Self {
        let workspace = TempDir::new().expect("Failed to create workspace");
        let factory = MockClientFactory::new(server.clone());
        let settings = Arc::new(MemorySettingsProvider::new(settings));
        let logger = MemoryLogger::new();
        let engine = SyncEngine::builder(workspace.path())
            .with_settings(Arc::clone(&settings) as Arc<dyn SettingsProvider>)
            .with_notifier(Arc::clone(&notifier) as _)
            .with_logger(Arc::clone(&logger) as _)
            .with_client_factory(Arc::clone(&factory) as _)
            .with_retry_policy(RetryPolicy::new(
                RetryPolicy::DEFAULT_MAX_RETRIES,
                TEST_RETRY_DELAY,
            ))
            .build()
            .await
            .expect("Failed to build engine");

        Self {
            workspace,
            server,
            factory,
            settings,
            notifier,
            logger,
            engine,
        }
    }

    /// Engine that has already connected
    pub async fn connected(server: MockServer) -> Result<Self> {
        let harness = Self::new(server).await;
        harness.engine.connect().await?;
        Ok(harness)
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        self.workspace.path()
    }

    /// Write a workspace file
    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        write_file(self.root(), relative, contents)
    }
}
