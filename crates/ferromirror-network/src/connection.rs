//! Session lifecycle: connect, liveness probing, discard and reconnect

use crate::factory::ClientFactory;
use ferromirror_types::{ConnectionConfig, Error, ProtocolClient, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the managed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session
    #[default]
    Disconnected,
    /// A connect attempt is running
    Connecting,
    /// A session is live
    Connected,
    /// The session failed its liveness probe and is about to be replaced
    Stale,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Successful connects, first ones included
    pub connects: u64,
    /// Successful connects that replaced a discarded or stale session
    pub reconnects: u64,
    /// Liveness probes that failed
    pub probe_failures: u64,
    /// Sessions thrown away by [`ConnectionManager::discard`]
    pub discards: u64,
}

/// Owner of the single protocol session
///
/// The manager is not internally synchronised; callers serialise access to it
/// (the transfer queue worker is the only writer during normal operation).
/// The `enabled` flag is shared so that deactivation can be observed without
/// taking that lock.
pub struct ConnectionManager {
    factory: Arc<dyn ClientFactory>,
    client: Option<Box<dyn ProtocolClient>>,
    config: Option<ConnectionConfig>,
    state: ConnectionState,
    enabled: Arc<AtomicBool>,
    stats: ConnectionStats,
    replacing: bool,
}

impl ConnectionManager {
    /// Create a disconnected, disabled manager
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            client: None,
            config: None,
            state: ConnectionState::Disconnected,
            enabled: Arc::new(AtomicBool::new(false)),
            stats: ConnectionStats::default(),
            replacing: false,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Counters since construction
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Config of the current or most recent session
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Remember a config for the next [`ensure_connection`](Self::ensure_connection)
    /// without connecting. A different config replaces the live session.
    pub fn set_config(&mut self, config: ConnectionConfig) {
        if self.config.as_ref() != Some(&config) && self.client.is_some() {
            debug!("Connection settings changed, dropping current session");
            self.client = None;
            self.state = ConnectionState::Disconnected;
        }
        self.config = Some(config);
    }

    /// Whether the engine is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Shared handle on the enabled flag
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    /// Whether a live client is held
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    /// The live client
    pub fn client_mut(&mut self) -> Result<&mut (dyn ProtocolClient + 'static)> {
        self.client.as_deref_mut().ok_or(Error::NotConnected)
    }

    /// Connect with `config`; a no-op when already connected with the same config
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<()> {
        if self.is_connected() && self.config.as_ref() == Some(&config) {
            debug!("Already connected to {}", config.address());
            return Ok(());
        }

        if let Some(mut previous) = self.client.take() {
            if let Err(e) = previous.disconnect().await {
                debug!("Ignoring disconnect failure of previous session: {}", e);
            }
        }

        self.state = ConnectionState::Connecting;
        let mut client = self.factory.create(config.protocol);
        match client.connect(&config).await {
            Ok(()) => {
                self.client = Some(client);
                self.config = Some(config);
                self.state = ConnectionState::Connected;
                self.enabled.store(true, Ordering::SeqCst);
                self.stats.connects += 1;
                if std::mem::take(&mut self.replacing) {
                    self.stats.reconnects += 1;
                    info!("Reconnected ({} so far)", self.stats.reconnects);
                }
                Ok(())
            }
            Err(e) => {
                drop(client);
                self.state = ConnectionState::Disconnected;
                self.config = Some(config);
                error!("Connection failed: {}", e);
                Err(e)
            }
        }
    }

    /// Make sure a live session exists, probing an existing one with `pwd`
    ///
    /// Never fails; `false` means no session could be established.
    pub async fn ensure_connection(&mut self) -> bool {
        if let Some(client) = self.client.as_mut() {
            match client.pwd().await {
                Ok(_) => return true,
                Err(e) => {
                    warn!("Session failed liveness probe: {}", e);
                    self.stats.probe_failures += 1;
                    self.state = ConnectionState::Stale;
                    self.client = None;
                    self.replacing = true;
                }
            }
        }

        let Some(config) = self.config.clone() else {
            warn!("No connection settings to connect with");
            return false;
        };
        self.connect(config).await.is_ok()
    }

    /// Throw the current session away so the next use reconnects
    ///
    /// No goodbye is sent: the session is presumed broken.
    pub fn discard(&mut self) {
        if self.client.take().is_some() {
            self.stats.discards += 1;
            self.replacing = true;
            debug!("Session discarded");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Disable, disconnect and forget the config
    pub async fn deactivate(&mut self) {
        self.enabled.store(false, Ordering::SeqCst);
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!("Ignoring disconnect failure during deactivation: {}", e);
            }
        }
        self.config = None;
        self.replacing = false;
        self.state = ConnectionState::Disconnected;
        info!("Connection deactivated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferromirror_types::{FileInfo, Protocol};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Script {
        connects: AtomicUsize,
        fail_connect: AtomicBool,
        fail_probe: AtomicBool,
        disconnects: AtomicUsize,
    }

    struct ScriptedClient {
        script: Arc<Script>,
        connected: bool,
    }

    #[async_trait]
    impl ProtocolClient for ScriptedClient {
        fn protocol(&self) -> Protocol {
            Protocol::Ftp
        }
        async fn connect(&mut self, _config: &ConnectionConfig) -> Result<()> {
            self.script.connects.fetch_add(1, Ordering::SeqCst);
            if self.script.fail_connect.load(Ordering::SeqCst) {
                return Err(Error::connection("refused"));
            }
            self.connected = true;
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<()> {
            self.script.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected = false;
            Err(Error::network("socket hang up"))
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        async fn upload(&mut self, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }
        async fn download(&mut self, _: &str, _: &Path) -> Result<()> {
            Ok(())
        }
        async fn delete(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn delete_empty_directory(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn delete_directory(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn list(&mut self, _: &str) -> Result<Vec<FileInfo>> {
            Ok(Vec::new())
        }
        async fn rename(&mut self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn mkdir(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn pwd(&mut self) -> Result<String> {
            if self.script.fail_probe.swap(false, Ordering::SeqCst) {
                Err(Error::network("connection reset by peer"))
            } else {
                Ok("/html".to_string())
            }
        }
        async fn cd(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedFactory(Arc<Script>);

    impl ClientFactory for ScriptedFactory {
        fn create(&self, _protocol: Protocol) -> Box<dyn ProtocolClient> {
            Box::new(ScriptedClient {
                script: Arc::clone(&self.0),
                connected: false,
            })
        }
    }

    fn setup() -> (ConnectionManager, Arc<Script>, ConnectionConfig) {
        let script = Arc::new(Script::default());
        let manager = ConnectionManager::new(Arc::new(ScriptedFactory(Arc::clone(&script))));
        let config = ConnectionConfig::new(Protocol::Ftp, "ftp.example.com", "u", "p", "/html");
        (manager, script, config)
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (mut manager, script, config) = setup();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_enabled());

        manager.connect(config.clone()).await.unwrap();
        manager.connect(config).await.unwrap();

        assert_eq!(script.connects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_enabled());
        assert_eq!(manager.stats().reconnects, 0);
    }

    #[tokio::test]
    async fn test_failed_connect_discards_client() {
        let (mut manager, script, config) = setup();
        script.fail_connect.store(true, Ordering::SeqCst);

        let err = manager.connect(config).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.client_mut().is_err());
        assert!(!manager.is_enabled());
    }

    #[tokio::test]
    async fn test_stale_probe_reconnects() {
        let (mut manager, script, config) = setup();
        manager.connect(config).await.unwrap();

        script.fail_probe.store(true, Ordering::SeqCst);
        assert!(manager.ensure_connection().await);

        let stats = manager.stats();
        assert_eq!(stats.probe_failures, 1);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.connects, 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_ensure_connection_never_fails_loudly() {
        let (mut manager, script, config) = setup();
        assert!(!manager.ensure_connection().await);

        manager.set_config(config);
        script.fail_connect.store(true, Ordering::SeqCst);
        assert!(!manager.ensure_connection().await);

        script.fail_connect.store(false, Ordering::SeqCst);
        assert!(manager.ensure_connection().await);
    }

    #[tokio::test]
    async fn test_discard_then_ensure_counts_reconnect() {
        let (mut manager, _script, config) = setup();
        manager.connect(config).await.unwrap();

        manager.discard();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.ensure_connection().await);
        assert_eq!(manager.stats().discards, 1);
        assert_eq!(manager.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_deactivate_swallows_disconnect_errors() {
        let (mut manager, script, config) = setup();
        manager.connect(config).await.unwrap();
        let flag = manager.enabled_flag();

        manager.deactivate().await;

        assert_eq!(script.disconnects.load(Ordering::SeqCst), 1);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(manager.config().is_none());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.ensure_connection().await);
    }
}
