//! JSON output structures for the FerroMirror CLI

use ferromirror_engine::TransferOutcome;
use ferromirror_sync::SyncReport;
use ferromirror_types::{FileInfo, RemoteManifest};
use serde::{Deserialize, Serialize};

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// FerroMirror version
    pub version: String,
    /// Operation type
    pub operation: String,
    /// Timestamp when the operation finished
    pub timestamp: String,
    /// Workspace root
    pub workspace: String,
}

impl OperationMetadata {
    /// Metadata stamped with the current time
    pub fn new(operation: &str, workspace: &std::path::Path) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            workspace: workspace.display().to_string(),
        }
    }
}

/// Result of `pull`
#[derive(Debug, Serialize, Deserialize)]
pub struct PullJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Sync report
    pub report: SyncReport,
}

/// Result of `ls`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListingJson {
    /// One directory
    Entries {
        /// Listed remote path
        path: String,
        /// Directory entries
        entries: Vec<FileInfo>,
    },
    /// Recursive listing
    Tree {
        /// Listed remote path
        path: String,
        /// Directories, parents first
        directories: Vec<String>,
        /// Files
        files: Vec<String>,
        /// Directories that could not be listed
        unreadable: Vec<String>,
    },
}

impl ListingJson {
    /// Wrap a recursive listing
    pub fn tree(path: &str, manifest: RemoteManifest) -> Self {
        Self::Tree {
            path: path.to_string(),
            directories: manifest.directories,
            files: manifest.files,
            unreadable: manifest.unreadable,
        }
    }
}

/// Outcome of one queued transfer
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferJson {
    /// Operation and path as typed
    pub operation: String,
    /// completed, skipped, dropped or failed
    pub outcome: String,
    /// Reason or error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransferJson {
    /// Describe `outcome` for `operation`
    pub fn new(operation: String, outcome: &TransferOutcome) -> Self {
        let (outcome, message) = match outcome {
            TransferOutcome::Completed => ("completed", None),
            TransferOutcome::Skipped { reason } => ("skipped", Some(reason.clone())),
            TransferOutcome::Dropped => ("dropped", None),
            TransferOutcome::Failed { message } => ("failed", Some(message.clone())),
        };
        Self {
            operation,
            outcome: outcome.to_string(),
            message,
        }
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_json() {
        let json = TransferJson::new(
            "upload a.txt".to_string(),
            &TransferOutcome::Failed {
                message: "denied".to_string(),
            },
        );
        assert_eq!(json.outcome, "failed");
        let text = serde_json::to_string(&json).unwrap();
        assert!(text.contains("\"message\":\"denied\""));

        let json = TransferJson::new("upload a.txt".to_string(), &TransferOutcome::Completed);
        let text = serde_json::to_string(&json).unwrap();
        assert!(!text.contains("message"));
    }

    #[test]
    fn test_tree_listing() {
        let mut manifest = RemoteManifest::new();
        manifest.push_directory("a");
        manifest.push_file("a/b.txt", 3);
        let text = serde_json::to_string(&ListingJson::tree("", manifest)).unwrap();
        assert!(text.contains("\"directories\":[\"a\"]"));
        assert!(text.contains("\"files\":[\"a/b.txt\"]"));
    }
}
