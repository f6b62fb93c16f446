//! Initial pull of the remote tree and server-side moves

use crate::exclude::ExcludeFilter;
use crate::manifest::list_remote_recursive;
use crate::progress::{ProgressTracker, SyncPhase};
use ferromirror_types::path::to_local;
use ferromirror_types::{Error, Logger, ProgressReporter, ProtocolClient, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One manifest item that could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Remote-relative path
    pub path: String,
    /// What went wrong
    pub message: String,
}

/// Outcome of an initial sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Local directories created or already present
    pub directories_created: usize,
    /// Files downloaded
    pub files_downloaded: usize,
    /// Files left alone because the local size already matched
    pub files_skipped: usize,
    /// Manifest items matched by an exclude pattern
    pub excluded: usize,
    /// Items that failed; siblings were still processed
    pub failures: Vec<SyncFailure>,
    /// Remote directories that could not be listed
    pub unreadable: Vec<String>,
    /// The run stopped early on request
    pub cancelled: bool,
}

impl SyncReport {
    /// One-line summary for notifications
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} directories, {} files downloaded",
            self.directories_created, self.files_downloaded
        );
        if self.files_skipped > 0 {
            summary.push_str(&format!(", {} unchanged", self.files_skipped));
        }
        if self.excluded > 0 {
            summary.push_str(&format!(", {} excluded", self.excluded));
        }
        if !self.failures.is_empty() {
            summary.push_str(&format!(", {} failed", self.failures.len()));
        }
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}

/// How a move was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStrategy {
    /// The server renamed the entry
    Renamed,
    /// Download, upload, delete through a local temp file
    Copied,
}

/// Pulls the remote tree into the workspace
pub struct TreeSynchronizer {
    workspace_root: PathBuf,
    filter: ExcludeFilter,
    skip_unchanged: bool,
    logger: Arc<dyn Logger>,
}

impl TreeSynchronizer {
    /// Create a synchronizer rooted at `workspace_root`
    pub fn new(workspace_root: impl Into<PathBuf>, filter: ExcludeFilter, logger: Arc<dyn Logger>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            filter,
            skip_unchanged: false,
            logger,
        }
    }

    /// Skip downloads whose local file already has the remote size
    pub fn with_skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    /// Workspace the tree is pulled into
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Exclude patterns in effect
    pub fn filter(&self) -> &ExcludeFilter {
        &self.filter
    }

    fn record_failure(&self, report: &mut SyncReport, path: &str, what: &str, error: &Error) {
        let message = format!("{what} '{path}' failed: {error}");
        warn!("{}", message);
        self.logger.log(&message);
        report.failures.push(SyncFailure {
            path: path.to_string(),
            message: error.to_string(),
        });
    }

    /// Mirror the remote tree into the workspace
    ///
    /// Directories are created first, parents before children, then files are
    /// downloaded. A failing item is logged and skipped. Cancellation is
    /// checked between items and leaves finished items in place. Only a
    /// failure to list the remote root aborts the run.
    pub async fn initial_sync(
        &self,
        client: &mut dyn ProtocolClient,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }

        let mut tracker = ProgressTracker::new(reporter);
        let manifest = match list_remote_recursive(client, "").await {
            Ok(manifest) => manifest,
            Err(e) => {
                self.logger.log(&format!("Initial sync aborted: {e}"));
                tracker.finish(SyncPhase::Failed, "Could not read the remote tree");
                return Err(e);
            }
        };

        let mut report = SyncReport {
            unreadable: manifest.unreadable.clone(),
            ..SyncReport::default()
        };
        for path in &report.unreadable {
            self.logger.log(&format!("Could not list remote directory '{path}'"));
        }

        let directories: Vec<&String> = manifest
            .directories
            .iter()
            .filter(|d| !self.filter.is_excluded(d))
            .collect();
        let files: Vec<&String> = manifest
            .files
            .iter()
            .filter(|f| !self.filter.is_excluded(f))
            .collect();
        report.excluded = manifest.total() - directories.len() - files.len();
        tracker.set_total((directories.len() + files.len()) as u64);
        info!(
            "Syncing {} directories and {} files ({} excluded)",
            directories.len(),
            files.len(),
            report.excluded
        );

        tracker.set_phase(SyncPhase::CreatingDirectories);
        for directory in directories {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let local = to_local(directory, &self.workspace_root);
            match tokio::fs::create_dir_all(&local).await {
                Ok(()) => report.directories_created += 1,
                Err(e) => self.record_failure(&mut report, directory, "Creating directory", &Error::from(e)),
            }
            tracker.item_done(directory);
        }

        if !report.cancelled {
            tracker.set_phase(SyncPhase::Downloading);
            for file in files {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let local = to_local(file, &self.workspace_root);
                let remote_size = manifest.sizes.get(file.as_str()).copied();
                if self.skip_unchanged && is_same_size(&local, remote_size).await {
                    debug!("Unchanged, skipping {}", file);
                    report.files_skipped += 1;
                } else {
                    match client.download(file, &local).await {
                        Ok(()) => report.files_downloaded += 1,
                        Err(e) => self.record_failure(&mut report, file, "Downloading", &e),
                    }
                }
                tracker.item_done(file);
            }
        }

        let summary = report.summary();
        if report.cancelled {
            info!("Initial sync cancelled: {}", summary);
            tracker.finish(SyncPhase::Cancelled, &summary);
        } else {
            info!("Initial sync finished: {}", summary);
            tracker.finish(SyncPhase::Completed, &summary);
        }
        self.logger.log(&format!("Initial sync: {summary}"));
        Ok(report)
    }
}

async fn is_same_size(local: &Path, remote_size: Option<u64>) -> bool {
    let Some(remote_size) = remote_size else {
        return false;
    };
    tokio::fs::metadata(local)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() == remote_size)
}

/// Move a remote entry, copying through a temp file when rename fails
///
/// A failure in the copy path is returned as is; there is no second fallback.
pub async fn move_file(
    client: &mut dyn ProtocolClient,
    old_path: &str,
    new_path: &str,
) -> Result<MoveStrategy> {
    match client.rename(old_path, new_path).await {
        Ok(()) => {
            debug!("Renamed {} to {}", old_path, new_path);
            return Ok(MoveStrategy::Renamed);
        }
        Err(e) => warn!("Rename of {} failed ({}), copying instead", old_path, e),
    }

    let temp = tempfile::Builder::new()
        .prefix("ferromirror-move-")
        .tempfile()?;
    client.download(old_path, temp.path()).await?;
    client.upload(temp.path(), new_path).await?;
    client.delete(old_path).await?;
    temp.close()?;
    debug!("Copied {} to {} and removed the original", old_path, new_path);
    Ok(MoveStrategy::Copied)
}
