//! Transfer operations and their lifecycle

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Unique identifier for a queued transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote change requested by a local file event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOp {
    /// Upload a local file to its mirrored remote path
    Upload {
        /// Local file
        local: PathBuf,
    },
    /// Delete the remote counterpart of a local path
    Delete {
        /// Local path that went away
        local: PathBuf,
    },
    /// Move a remote entry after a local rename
    Move {
        /// Old local path
        old: PathBuf,
        /// New local path
        new: PathBuf,
    },
    /// Create a remote directory
    Mkdir {
        /// Remote-relative directory
        remote: String,
    },
}

impl TransferOp {
    /// Deduplication key
    ///
    /// Path operations are keyed by the local path they were raised for, so an
    /// upload and a delete of the same file exclude each other. Directory
    /// creation is keyed by operation and remote path.
    pub fn key(&self) -> String {
        match self {
            Self::Upload { local } | Self::Delete { local } | Self::Move { old: local, .. } => {
                local.display().to_string()
            }
            Self::Mkdir { remote } => format!("mkdir:{remote}"),
        }
    }

    /// Short verb for status lines
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::Delete { .. } => "delete",
            Self::Move { .. } => "move",
            Self::Mkdir { .. } => "mkdir",
        }
    }
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload { local } => write!(f, "upload {}", local.display()),
            Self::Delete { local } => write!(f, "delete {}", local.display()),
            Self::Move { old, new } => write!(f, "move {} -> {}", old.display(), new.display()),
            Self::Mkdir { remote } => write!(f, "mkdir {remote}"),
        }
    }
}

/// How a queued transfer settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The remote side now reflects the change
    Completed,
    /// Nothing to do, e.g. the path is outside the workspace
    Skipped {
        /// Why the item was skipped
        reason: String,
    },
    /// The engine was disabled before the item ran
    Dropped,
    /// The item failed and was reported
    Failed {
        /// User facing failure message
        message: String,
    },
}

impl TransferOutcome {
    /// Whether the remote change was applied
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether the item failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One entry of the transfer queue
#[derive(Debug)]
pub struct QueueItem {
    /// Task ID
    pub id: TaskId,
    /// Requested operation
    pub op: TransferOp,
    /// Retries made so far
    pub retry_count: u32,
    /// When the item was queued
    pub enqueued_at: Instant,
    pub(crate) done: oneshot::Sender<TransferOutcome>,
}

impl QueueItem {
    pub(crate) fn new(op: TransferOp, done: oneshot::Sender<TransferOutcome>) -> Self {
        Self {
            id: TaskId::new(),
            op,
            retry_count: 0,
            enqueued_at: Instant::now(),
            done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_task_id_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(!a.as_uuid().is_nil());
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[rstest]
    #[case(TransferOp::Upload { local: "/ws/a.txt".into() }, "/ws/a.txt")]
    #[case(TransferOp::Delete { local: "/ws/a.txt".into() }, "/ws/a.txt")]
    #[case(TransferOp::Move { old: "/ws/a.txt".into(), new: "/ws/b.txt".into() }, "/ws/a.txt")]
    #[case(TransferOp::Mkdir { remote: "src".into() }, "mkdir:src")]
    fn test_keys(#[case] op: TransferOp, #[case] key: &str) {
        assert_eq!(op.key(), key);
    }

    #[test]
    fn test_display() {
        let op = TransferOp::Move {
            old: "/ws/a.txt".into(),
            new: "/ws/b.txt".into(),
        };
        assert_eq!(op.to_string(), "move /ws/a.txt -> /ws/b.txt");
        assert_eq!(op.verb(), "move");
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(TransferOutcome::Completed.is_completed());
        assert!(TransferOutcome::Failed {
            message: "x".into()
        }
        .is_failed());
        assert!(!TransferOutcome::Dropped.is_completed());
    }
}
