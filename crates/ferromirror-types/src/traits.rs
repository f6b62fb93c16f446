//! Core traits for FerroMirror
//!
//! [`ProtocolClient`] is the single capability contract every wire protocol
//! implements. [`Notifier`], [`ProgressReporter`] and [`Logger`] are the
//! collaborators the engine reports through; front ends supply their own.

use crate::{ConnectionConfig, FileInfo, ProgressUpdate, Protocol, Result};
use async_trait::async_trait;
use std::path::Path;

/// Operations a remote session must support
///
/// Remote paths are relative to the configured remote root unless they start
/// with `/`. An implementation owns exactly one underlying session; every
/// operation other than `connect` fails with [`crate::Error::NotConnected`]
/// until `connect` has succeeded.
#[async_trait]
pub trait ProtocolClient: Send {
    /// Protocol this client speaks
    fn protocol(&self) -> Protocol;

    /// Open the session. A failed connect leaves no partial session behind.
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()>;

    /// Close the session
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether a session is currently held
    fn is_connected(&self) -> bool;

    /// Upload a local file
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Download a remote file, overwriting `local_path`
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Delete a file
    async fn delete(&mut self, remote_path: &str) -> Result<()>;

    /// Delete a directory that must already be empty
    async fn delete_empty_directory(&mut self, remote_path: &str) -> Result<()>;

    /// Delete a directory and everything below it
    async fn delete_directory(&mut self, remote_path: &str) -> Result<()>;

    /// List a directory; `""` lists the remote root
    async fn list(&mut self, remote_path: &str) -> Result<Vec<FileInfo>>;

    /// Rename or move an entry on the server
    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()>;

    /// Create a directory and any missing parents; existing directories are fine
    async fn mkdir(&mut self, remote_path: &str) -> Result<()>;

    /// Current remote directory
    async fn pwd(&mut self) -> Result<String>;

    /// Change the current remote directory
    async fn cd(&mut self, remote_path: &str) -> Result<()>;
}

/// Sink for one progress-reporting operation
pub trait ProgressReporter: Send + Sync {
    /// Report a progress tick
    fn report(&self, update: &ProgressUpdate);

    /// Mark the operation finished
    fn finish(&self, message: &str);
}

/// User-facing notifications
pub trait Notifier: Send + Sync {
    /// Short transient state string, e.g. for a status indicator
    fn status(&self, text: &str);

    /// Informational message
    fn info(&self, text: &str);

    /// Warning with choices; returns the selected choice, if any
    fn warn(&self, text: &str, choices: &[&str]) -> Option<String>;

    /// Error message
    fn error(&self, text: &str);

    /// Start a progress display
    fn progress(&self, title: &str, cancellable: bool) -> Box<dyn ProgressReporter>;
}

/// Line oriented log sink. Timestamps are the sink's business.
pub trait Logger: Send + Sync {
    /// Append a line
    fn log(&self, line: &str);

    /// Bring the log in front of the user
    fn show(&self) {}

    /// Release the sink
    fn dispose(&self) {}
}

/// Logger that forwards every line to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, line: &str) {
        tracing::info!(target: "ferromirror::log", "{}", line);
    }
}

/// Notifier that only writes to `tracing`, for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn status(&self, text: &str) {
        tracing::debug!("status: {}", text);
    }

    fn info(&self, text: &str) {
        tracing::info!("{}", text);
    }

    fn warn(&self, text: &str, _choices: &[&str]) -> Option<String> {
        tracing::warn!("{}", text);
        None
    }

    fn error(&self, text: &str) {
        tracing::error!("{}", text);
    }

    fn progress(&self, title: &str, _cancellable: bool) -> Box<dyn ProgressReporter> {
        Box::new(TracingProgress {
            title: title.to_string(),
        })
    }
}

struct TracingProgress {
    title: String,
}

impl ProgressReporter for TracingProgress {
    fn report(&self, update: &ProgressUpdate) {
        tracing::debug!(
            "{}: {}/{} {}",
            self.title,
            update.processed,
            update.total,
            update.message
        );
    }

    fn finish(&self, message: &str) {
        tracing::info!("{}: {}", self.title, message);
    }
}
