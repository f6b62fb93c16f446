//! Serialized transfer queue
//!
//! Producers push [`TransferOp`]s from any task; a single worker drains them in
//! FIFO order so that at most one network operation uses the session at a
//! time. Each producer awaits the outcome of its own item.

use crate::task::{QueueItem, TransferOp, TransferOutcome};
use ferromirror_network::ConnectionManager;
use ferromirror_sync::move_file;
use ferromirror_types::path::{directory_of, to_remote};
use ferromirror_types::{Error, Logger, Notifier, ProtocolClient, Result, RetryPolicy};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Markers of a server refusing work because another transfer holds the session
const BUSY_MARKERS: &[&str] = &["another task", "still running", "already running"];

/// Everything the worker needs to run items
pub struct WorkerContext {
    /// Session owner shared with the engine
    pub connection: Arc<tokio::sync::Mutex<ConnectionManager>>,
    /// Engine enabled flag
    pub enabled: Arc<AtomicBool>,
    /// User notifications
    pub notifier: Arc<dyn Notifier>,
    /// Output channel
    pub logger: Arc<dyn Logger>,
    /// Local directory mirrored by the remote root
    pub workspace_root: PathBuf,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

/// Operation with its remote paths resolved
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteOp {
    Upload { local: PathBuf, remote: String },
    Delete { remote: String },
    Move { from: String, to: String },
    Mkdir { remote: String },
}

impl RemoteOp {
    fn label(&self) -> String {
        match self {
            Self::Upload { remote, .. } => format!("Upload {remote}"),
            Self::Delete { remote } => format!("Delete {remote}"),
            Self::Move { from, to } => format!("Move {from} -> {to}"),
            Self::Mkdir { remote } => format!("Create directory {remote}"),
        }
    }
}

/// Map local paths of `op` to remote paths, `Err` carrying the skip reason
fn resolve(op: &TransferOp, workspace_root: &Path) -> std::result::Result<RemoteOp, String> {
    let map = |local: &Path| match to_remote(local, Some(workspace_root)) {
        Some(remote) if !remote.is_empty() => Ok(remote),
        Some(_) => Err("the workspace root itself is not transferred".to_string()),
        None => Err(format!("{} is outside the workspace", local.display())),
    };

    match op {
        TransferOp::Upload { local } => Ok(RemoteOp::Upload {
            remote: map(local)?,
            local: local.clone(),
        }),
        TransferOp::Delete { local } => Ok(RemoteOp::Delete { remote: map(local)? }),
        TransferOp::Move { old, new } => Ok(RemoteOp::Move {
            from: map(old)?,
            to: map(new)?,
        }),
        TransferOp::Mkdir { remote } => {
            let remote = remote.trim_matches('/');
            if remote.is_empty() || remote == "." {
                Err("the remote root always exists".to_string())
            } else {
                Ok(RemoteOp::Mkdir {
                    remote: remote.to_string(),
                })
            }
        }
    }
}

/// Create the parent of `remote` unless it is the root
async fn ensure_parent(client: &mut dyn ProtocolClient, remote: &str) -> Result<()> {
    let parent = directory_of(remote);
    if parent == "." {
        return Ok(());
    }
    client.mkdir(parent).await
}

async fn execute(client: &mut dyn ProtocolClient, op: &RemoteOp) -> Result<()> {
    match op {
        RemoteOp::Upload { local, remote } => {
            ensure_parent(client, remote).await?;
            client.upload(local, remote).await
        }
        RemoteOp::Delete { remote } => match client.delete(remote).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                // Delete events do not say whether the path was a directory
                debug!("Deleting {} as a file failed ({}), trying as a directory", remote, e);
                client.delete_directory(remote).await
            }
        },
        RemoteOp::Move { from, to } => {
            ensure_parent(client, to).await?;
            move_file(client, from, to).await.map(|strategy| {
                debug!("Moved {} to {} ({:?})", from, to, strategy);
            })
        }
        RemoteOp::Mkdir { remote } => client.mkdir(remote).await,
    }
}

/// User facing message for a failed item
fn failure_message(label: &str, error: &Error, retries: u32, policy: &RetryPolicy) -> String {
    let text = error.to_string().to_ascii_lowercase();
    if BUSY_MARKERS.iter().any(|marker| text.contains(marker)) {
        return format!(
            "{label} failed: the server is still busy with another transfer, try again shortly"
        );
    }
    if error.is_transient() && !policy.allows_retry(retries) && retries > 0 {
        let exhausted = Error::RetriesExhausted {
            attempts: retries + 1,
            message: error.to_string(),
        };
        return format!("{label} failed: {exhausted}");
    }
    format!("{label} failed: {error}")
}

impl WorkerContext {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// One attempt: make sure a session exists, then run the operation
    async fn attempt(&self, op: &RemoteOp) -> Result<()> {
        let mut manager = self.connection.lock().await;
        if !manager.ensure_connection().await {
            return Err(Error::connection("could not establish a session"));
        }
        let client = manager.client_mut()?;
        execute(client, op).await
    }

    /// Run one item to settlement
    async fn process(&self, item: &mut QueueItem) -> TransferOutcome {
        let op = match resolve(&item.op, &self.workspace_root) {
            Ok(op) => op,
            Err(reason) => {
                let line = format!("Skipping {}: {reason}", item.op);
                debug!("{}", line);
                self.logger.log(&line);
                return TransferOutcome::Skipped { reason };
            }
        };
        let label = op.label();

        loop {
            if !self.is_enabled() {
                debug!("Engine disabled, dropping {}", label);
                return TransferOutcome::Dropped;
            }

            self.notifier.status(&format!("{label} (in progress)"));
            let error = match self.attempt(&op).await {
                Ok(()) => {
                    info!("{} completed", label);
                    self.logger.log(&format!("{label} completed"));
                    self.notifier.status(&format!("{label} (completed)"));
                    return TransferOutcome::Completed;
                }
                Err(e) => e,
            };

            if error.is_transient() && self.retry.allows_retry(item.retry_count) {
                item.retry_count += 1;
                let line = format!(
                    "{label} hit a transient error ({error}), retrying {}/{}",
                    item.retry_count, self.retry.max_retries
                );
                warn!("{}", line);
                self.logger.log(&line);
                self.notifier.status(&format!(
                    "{label} (retrying {}/{})",
                    item.retry_count, self.retry.max_retries
                ));
                self.connection.lock().await.discard();
                tokio::time::sleep(self.retry.delay).await;
                continue;
            }

            let message = failure_message(&label, &error, item.retry_count, &self.retry);
            error!("{}", message);
            self.logger.log(&message);
            self.notifier.status(&format!("{label} (failed)"));
            self.notifier.error(&message);
            return TransferOutcome::Failed { message };
        }
    }
}

/// Handle for submitting transfers to the worker
pub struct TransferQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    active: Arc<Mutex<HashSet<String>>>,
}

impl TransferQueue {
    /// Spawn the worker; must be called inside a Tokio runtime
    ///
    /// The worker stops once the queue handle is dropped and the items already
    /// sent have settled.
    pub fn spawn(context: WorkerContext) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueItem>();
        let active = Arc::new(Mutex::new(HashSet::new()));
        let worker_active = Arc::clone(&active);

        tokio::spawn(async move {
            while let Some(mut item) = rx.recv().await {
                debug!("Processing transfer {} ({})", item.id, item.op);
                let outcome = context.process(&mut item).await;
                // Cleared before settling so the caller can re-queue right away
                worker_active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&item.op.key());
                if item.done.send(outcome).is_err() {
                    debug!("Caller of transfer {} went away", item.id);
                }
            }
            debug!("Transfer queue closed");
        });

        Self { tx, active }
    }

    /// Queue `op` and wait until it settles
    ///
    /// Fails with [`Error::AlreadyQueued`] without queueing when an operation
    /// with the same key is waiting or running.
    pub async fn enqueue(&self, op: TransferOp) -> Result<TransferOutcome> {
        let key = op.key();
        if !self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone())
        {
            debug!("Rejecting duplicate transfer for {}", key);
            return Err(Error::AlreadyQueued { key });
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(QueueItem::new(op, done_tx)).is_err() {
            self.release(&key);
            return Err(Error::other("transfer queue is shut down"));
        }
        done_rx
            .await
            .map_err(|_| Error::other("transfer worker stopped before the item settled"))
    }

    /// Upload a local file
    pub async fn enqueue_upload(&self, local: impl Into<PathBuf>) -> Result<TransferOutcome> {
        self.enqueue(TransferOp::Upload { local: local.into() }).await
    }

    /// Delete the remote counterpart of a local path
    pub async fn enqueue_delete(&self, local: impl Into<PathBuf>) -> Result<TransferOutcome> {
        self.enqueue(TransferOp::Delete { local: local.into() }).await
    }

    /// Move a remote entry after a local rename
    pub async fn enqueue_move(
        &self,
        old: impl Into<PathBuf>,
        new: impl Into<PathBuf>,
    ) -> Result<TransferOutcome> {
        self.enqueue(TransferOp::Move {
            old: old.into(),
            new: new.into(),
        })
        .await
    }

    /// Create a remote directory
    pub async fn enqueue_mkdir(&self, remote: impl Into<String>) -> Result<TransferOutcome> {
        self.enqueue(TransferOp::Mkdir {
            remote: remote.into(),
        })
        .await
    }

    /// Number of operations waiting or running
    pub fn active_len(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether an operation with `key` is waiting or running
    pub fn is_active(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn release(&self, key: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[rstest]
    #[case(TransferOp::Upload { local: "/ws/src/a.txt".into() }, Ok(RemoteOp::Upload { local: "/ws/src/a.txt".into(), remote: "src/a.txt".into() }))]
    #[case(TransferOp::Delete { local: "/ws/a.txt".into() }, Ok(RemoteOp::Delete { remote: "a.txt".into() }))]
    #[case(TransferOp::Move { old: "/ws/a.txt".into(), new: "/ws/b/a.txt".into() }, Ok(RemoteOp::Move { from: "a.txt".into(), to: "b/a.txt".into() }))]
    #[case(TransferOp::Mkdir { remote: "/src/".into() }, Ok(RemoteOp::Mkdir { remote: "src".into() }))]
    fn test_resolve_in_scope(
        #[case] op: TransferOp,
        #[case] expected: std::result::Result<RemoteOp, String>,
    ) {
        assert_eq!(resolve(&op, Path::new("/ws")), expected);
    }

    #[rstest]
    #[case(TransferOp::Upload { local: "/elsewhere/a.txt".into() })]
    #[case(TransferOp::Upload { local: "/ws".into() })]
    #[case(TransferOp::Move { old: "/ws/a.txt".into(), new: "/tmp/a.txt".into() })]
    #[case(TransferOp::Mkdir { remote: ".".into() })]
    fn test_resolve_skips(#[case] op: TransferOp) {
        assert!(resolve(&op, Path::new("/ws")).is_err());
    }

    #[test]
    fn test_failure_message_busy() {
        let error = Error::protocol(Some(450), "Another task is still running");
        let message = failure_message("Upload a.txt", &error, 0, &policy());
        assert!(message.contains("still busy with another transfer"));
    }

    #[test]
    fn test_failure_message_exhausted() {
        let error = Error::network("read ECONNRESET");
        let message = failure_message("Upload a.txt", &error, 3, &policy());
        assert_eq!(
            message,
            "Upload a.txt failed: Gave up after 4 attempts: Network error: read ECONNRESET"
        );
    }

    #[test]
    fn test_failure_message_permanent() {
        let error = Error::protocol(Some(550), "Permission denied");
        let message = failure_message("Delete a.txt", &error, 0, &policy());
        assert_eq!(message, "Delete a.txt failed: Server error 550: Permission denied");
    }

    #[test]
    fn test_labels() {
        let op = RemoteOp::Move {
            from: "a".into(),
            to: "b".into(),
        };
        assert_eq!(op.label(), "Move a -> b");
    }
}
