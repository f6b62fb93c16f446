//! Planning a local directory push

use crate::exclude::ExcludeFilter;
use ferromirror_types::path::to_remote;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One remote operation needed to mirror a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStep {
    /// Create a remote directory (remote-relative path)
    Mkdir(String),
    /// Upload a local file
    Upload(PathBuf),
}

/// Walk `local_dir` and list the operations that mirror it remotely
///
/// Directories come before their contents. Entries outside `workspace_root`
/// or matched by `filter` are left out; excluded directories are not descended
/// into. Unreadable entries are logged and skipped.
pub fn plan_push(workspace_root: &Path, local_dir: &Path, filter: &ExcludeFilter) -> Vec<PushStep> {
    let remote_of = |path: &Path| to_remote(path, Some(workspace_root));

    let mut steps = Vec::new();
    let walker = WalkDir::new(local_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match remote_of(entry.path()) {
            Some(remote) => remote.is_empty() || !filter.is_excluded(&remote),
            None => false,
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry during push: {}", e);
                continue;
            }
        };
        let Some(remote) = remote_of(entry.path()) else {
            continue;
        };
        if remote.is_empty() {
            // The workspace root itself
            continue;
        }

        if entry.file_type().is_dir() {
            steps.push(PushStep::Mkdir(remote));
        } else if entry.file_type().is_file() {
            steps.push(PushStep::Upload(entry.into_path()));
        } else {
            debug!("Not pushing special file {}", entry.path().display());
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_plan_orders_parents_first_and_excludes() {
        let workspace = tempfile::tempdir().unwrap();
        let root = workspace.path();
        fs::create_dir_all(root.join("site/css")).unwrap();
        fs::create_dir_all(root.join("site/node_modules/pkg")).unwrap();
        fs::write(root.join("site/index.html"), "<html>").unwrap();
        fs::write(root.join("site/css/app.css"), "body{}").unwrap();
        fs::write(root.join("site/node_modules/pkg/index.js"), "x").unwrap();

        let filter = ExcludeFilter::new(&["node_modules"]).unwrap();
        let steps = plan_push(root, &root.join("site"), &filter);

        assert_eq!(
            steps,
            vec![
                PushStep::Mkdir("site".to_string()),
                PushStep::Mkdir("site/css".to_string()),
                PushStep::Upload(root.join("site/css/app.css")),
                PushStep::Upload(root.join("site/index.html")),
            ]
        );
    }

    #[test]
    fn test_plan_outside_workspace_is_empty() {
        let workspace = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        fs::write(elsewhere.path().join("a.txt"), "a").unwrap();

        let steps = plan_push(workspace.path(), elsewhere.path(), &ExcludeFilter::none());
        assert!(steps.is_empty());
    }
}
