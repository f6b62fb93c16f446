//! Main mirror engine implementation

use crate::events::FileEvent;
use crate::queue::{TransferQueue, WorkerContext};
use crate::task::{TransferOp, TransferOutcome};
use ferromirror_config::{FileSettingsProvider, SettingKey, Settings, SettingsProvider};
use ferromirror_network::{
    ClientFactory, ConnectionManager, ConnectionState, ConnectionStats, DefaultClientFactory,
};
use ferromirror_sync::{list_remote_recursive, plan_push, ExcludeFilter, PushStep, SyncReport, TreeSynchronizer};
use ferromirror_types::{
    Error, FileInfo, Logger, Notifier, RemoteManifest, Result, RetryPolicy, TracingLogger,
    TracingNotifier,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mirror engine for one workspace
///
/// Built once and shared as `Arc<SyncEngine>` with every event source.
pub struct SyncEngine {
    workspace_root: PathBuf,
    settings: Arc<dyn SettingsProvider>,
    notifier: Arc<dyn Notifier>,
    logger: Arc<dyn Logger>,
    connection: Arc<Mutex<ConnectionManager>>,
    enabled: Arc<AtomicBool>,
    queue: TransferQueue,
    running_syncs: std::sync::Mutex<Vec<(u64, CancellationToken)>>,
    next_sync_id: AtomicU64,
}

impl SyncEngine {
    /// Start building an engine for `workspace_root`
    pub fn builder(workspace_root: impl Into<PathBuf>) -> EngineBuilder {
        EngineBuilder::new().with_workspace_root(workspace_root)
    }

    /// Local directory mirrored by the remote root
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Settings store in use
    pub fn settings(&self) -> &Arc<dyn SettingsProvider> {
        &self.settings
    }

    /// Whether file events should be forwarded
    pub fn is_active(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Current session state
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.lock().await.state()
    }

    /// Session counters
    pub async fn connection_stats(&self) -> ConnectionStats {
        self.connection.lock().await.stats()
    }

    /// Transfer queue
    pub fn queue(&self) -> &TransferQueue {
        &self.queue
    }

    fn report_failure(&self, message: &str) {
        error!("{}", message);
        self.logger.log(message);
        self.notifier.error(message);
    }

    /// Open a session with the stored settings
    ///
    /// Missing host or credentials fail with [`Error::ConfigIncomplete`]
    /// before anything touches the network.
    pub async fn connect(&self) -> Result<()> {
        let config = match self.settings.settings().connection_config() {
            Ok(config) => config,
            Err(e) => {
                let e = Error::from(e);
                self.report_failure(&format!("Cannot connect: {e}"));
                return Err(e);
            }
        };

        let address = config.address();
        self.notifier.status(&format!("Connecting to {address}"));
        let mut manager = self.connection.lock().await;
        match manager.connect(config).await {
            Ok(()) => {
                info!("Connected to {}", address);
                self.logger.log(&format!("Connected to {address}"));
                self.notifier.status(&format!("Connected to {address}"));
                Ok(())
            }
            Err(e) => {
                self.notifier.status("Connection failed");
                self.report_failure(&format!("Could not connect to {address}: {e}"));
                Err(e)
            }
        }
    }

    /// Make sure a live session exists, reconnecting when needed
    pub async fn ensure_connection(&self) -> bool {
        let mut manager = self.connection.lock().await;
        if manager.config().is_none() {
            match self.settings.settings().connection_config() {
                Ok(config) => manager.set_config(config),
                Err(e) => {
                    debug!("No usable connection settings: {}", e);
                    return false;
                }
            }
        }
        manager.ensure_connection().await
    }

    /// Upload a saved file
    pub async fn upload_file(&self, local: impl Into<PathBuf>) -> Result<TransferOutcome> {
        self.queue.enqueue_upload(local).await
    }

    /// Delete the remote counterpart of a removed path
    pub async fn delete_file(&self, local: impl Into<PathBuf>) -> Result<TransferOutcome> {
        self.queue.enqueue_delete(local).await
    }

    /// Mirror a local rename
    pub async fn move_file(
        &self,
        old: impl Into<PathBuf>,
        new: impl Into<PathBuf>,
    ) -> Result<TransferOutcome> {
        self.queue.enqueue_move(old, new).await
    }

    /// Push a new local directory and everything below it
    ///
    /// Steps rejected as duplicates are logged and skipped; the remaining
    /// steps still run.
    pub async fn create_directory(&self, local_dir: &Path) -> Result<Vec<TransferOutcome>> {
        let filter = ExcludeFilter::new(self.settings.settings().sync_exclude.as_slice())?;
        let steps = plan_push(&self.workspace_root, local_dir, &filter);
        debug!("Pushing {} with {} steps", local_dir.display(), steps.len());

        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            let op = match step {
                PushStep::Mkdir(remote) => TransferOp::Mkdir { remote },
                PushStep::Upload(local) => TransferOp::Upload { local },
            };
            match self.queue.enqueue(op).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(Error::AlreadyQueued { key }) => {
                    self.logger.log(&format!("Already in progress, skipping {key}"));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    /// Forward a workspace change to the queue
    ///
    /// Ignored while the engine is inactive. Duplicate events for a path that
    /// is already being transferred are logged and dropped.
    pub async fn handle_event(&self, event: FileEvent) -> Vec<TransferOutcome> {
        if !self.is_active() {
            debug!("Engine inactive, ignoring {:?}", event);
            return Vec::new();
        }

        let result = match event {
            FileEvent::Saved(path) => self.upload_file(path).await.map(|o| vec![o]),
            FileEvent::Created(path) => {
                if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                    self.create_directory(&path).await
                } else {
                    self.upload_file(path).await.map(|o| vec![o])
                }
            }
            FileEvent::Deleted(path) => self.delete_file(path).await.map(|o| vec![o]),
            FileEvent::Renamed { from, to } => self.move_file(from, to).await.map(|o| vec![o]),
        };

        match result {
            Ok(outcomes) => outcomes,
            Err(Error::AlreadyQueued { key }) => {
                debug!("Duplicate event for {}", key);
                self.logger.log(&format!("Already in progress, skipping {key}"));
                Vec::new()
            }
            Err(e) => {
                warn!("Event could not be queued: {}", e);
                self.logger.log(&format!("Event could not be queued: {e}"));
                Vec::new()
            }
        }
    }

    /// Pull the remote tree into the workspace
    ///
    /// Holds the session for the whole run, so queued transfers wait until
    /// the sync finishes or is cancelled. [`SyncEngine::deactivate`] cancels
    /// it too.
    pub async fn initial_sync(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        if !self.is_active() {
            return Err(Error::NotConnected);
        }
        let settings = self.settings.settings();
        let filter = ExcludeFilter::new(settings.sync_exclude.as_slice())?;
        let synchronizer =
            TreeSynchronizer::new(&self.workspace_root, filter, Arc::clone(&self.logger))
                .with_skip_unchanged(settings.skip_unchanged);

        // Registered before waiting on the connection so deactivate can stop it
        let id = self.next_sync_id.fetch_add(1, Ordering::SeqCst);
        let run = cancel.child_token();
        self.running_syncs().push((id, run.clone()));
        let result = self.run_initial_sync(&synchronizer, &run).await;
        self.running_syncs().retain(|(running, _)| *running != id);
        result
    }

    fn running_syncs(&self) -> std::sync::MutexGuard<'_, Vec<(u64, CancellationToken)>> {
        self.running_syncs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_initial_sync(
        &self,
        synchronizer: &TreeSynchronizer,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let mut manager = self.connection.lock().await;
        if !manager.ensure_connection().await {
            let e = Error::connection("no session for initial sync");
            self.report_failure(&format!("Initial sync failed: {e}"));
            return Err(e);
        }
        let client = manager.client_mut()?;

        self.logger.log(&format!(
            "Initial sync into {}",
            self.workspace_root.display()
        ));
        let reporter = self.notifier.progress("Syncing remote files", true);
        match synchronizer
            .initial_sync(client, reporter.as_ref(), cancel)
            .await
        {
            Ok(report) => {
                self.notifier
                    .info(&format!("Initial sync finished: {}", report.summary()));
                Ok(report)
            }
            Err(e) => {
                self.report_failure(&format!("Initial sync failed: {e}"));
                Err(e)
            }
        }
    }

    /// List one remote directory
    pub async fn list_remote(&self, path: &str) -> Result<Vec<FileInfo>> {
        let mut manager = self.connection.lock().await;
        if !manager.ensure_connection().await {
            return Err(Error::NotConnected);
        }
        manager.client_mut()?.list(path).await
    }

    /// List a remote directory and everything below it
    pub async fn remote_manifest(&self, path: &str) -> Result<RemoteManifest> {
        let mut manager = self.connection.lock().await;
        if !manager.ensure_connection().await {
            return Err(Error::NotConnected);
        }
        list_remote_recursive(manager.client_mut()?, path).await
    }

    /// Store new settings, connect, and pull the tree when configured to
    ///
    /// Returns the sync report when a sync ran.
    pub async fn configure(
        &self,
        settings: Settings,
        cancel: &CancellationToken,
    ) -> Result<Option<SyncReport>> {
        settings.validate()?;
        for key in SettingKey::ALL {
            self.settings.set(key, settings.get(key))?;
        }
        self.logger.log("Settings saved");

        self.connect().await?;
        if !self.settings.settings().sync_on_connect {
            return Ok(None);
        }
        self.initial_sync(cancel).await.map(Some)
    }

    /// Disable the engine, close the session and forget the connection settings
    ///
    /// Safe to call while transfers are running: queued items are dropped
    /// once the flag is cleared, the in-flight one finishes first. A running
    /// initial sync is cancelled before the session is taken.
    pub async fn deactivate(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        for (_, run) in self.running_syncs().drain(..) {
            run.cancel();
        }
        self.connection.lock().await.deactivate().await;
        self.settings.clear_connection()?;
        self.notifier.status("Disconnected");
        self.logger.log("Deactivated, connection settings cleared");
        info!("Engine deactivated for {}", self.workspace_root.display());
        Ok(())
    }

    /// Ask for confirmation, then deactivate
    ///
    /// Returns whether the reset happened.
    pub async fn reset_config(&self) -> Result<bool> {
        let choice = self.notifier.warn(
            "Reset the connection settings for this workspace?",
            &["Reset", "Cancel"],
        );
        if choice.as_deref() != Some("Reset") {
            debug!("Reset declined");
            return Ok(false);
        }
        self.deactivate().await?;
        self.notifier.info("Connection settings reset");
        Ok(true)
    }

    /// Close the session but keep the settings
    pub async fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.connection.lock().await.deactivate().await;
        self.logger.dispose();
        info!("Engine shut down");
    }
}

/// Builder for creating a mirror engine with custom collaborators
#[derive(Default)]
pub struct EngineBuilder {
    workspace_root: Option<PathBuf>,
    settings: Option<Arc<dyn SettingsProvider>>,
    notifier: Option<Arc<dyn Notifier>>,
    logger: Option<Arc<dyn Logger>>,
    factory: Option<Arc<dyn ClientFactory>>,
    retry_policy: Option<RetryPolicy>,
}

impl EngineBuilder {
    /// Create a new engine builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace root
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Set the settings provider; defaults to the workspace settings file
    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the notifier; defaults to [`TracingNotifier`]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the logger; defaults to [`TracingLogger`]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the protocol client factory
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Override the retry policy taken from settings
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the engine and start its transfer worker
    pub async fn build(self) -> Result<Arc<SyncEngine>> {
        let workspace_root = self
            .workspace_root
            .ok_or_else(|| Error::config("a workspace root is required"))?;
        let settings: Arc<dyn SettingsProvider> = match self.settings {
            Some(settings) => settings,
            None => Arc::new(FileSettingsProvider::for_workspace(&workspace_root)?),
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger));
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultClientFactory::default()));
        let retry = self
            .retry_policy
            .unwrap_or_else(|| settings.settings().retry_policy());

        let manager = ConnectionManager::new(factory);
        let enabled = manager.enabled_flag();
        let connection = Arc::new(Mutex::new(manager));

        let queue = TransferQueue::spawn(WorkerContext {
            connection: Arc::clone(&connection),
            enabled: Arc::clone(&enabled),
            notifier: Arc::clone(&notifier),
            logger: Arc::clone(&logger),
            workspace_root: workspace_root.clone(),
            retry,
        });

        info!(
            "Mirror engine initialized successfully for {}",
            workspace_root.display()
        );

        Ok(Arc::new(SyncEngine {
            workspace_root,
            settings,
            notifier,
            logger,
            connection,
            enabled,
            queue,
            running_syncs: std::sync::Mutex::new(Vec::new()),
            next_sync_id: AtomicU64::new(0),
        }))
    }
}
