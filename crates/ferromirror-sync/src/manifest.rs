//! Recursive remote listing

use ferromirror_types::path::join_remote;
use ferromirror_types::{Error, ProtocolClient, RemoteManifest, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

/// List `path` and everything below it, depth first
///
/// Directories land in the manifest before anything inside them. Paths are
/// relative to the remote root, joined onto `path`. Only a failure to list
/// `path` itself is an error; subdirectories that cannot be listed are
/// recorded in [`RemoteManifest::unreadable`] and skipped.
pub async fn list_remote_recursive(
    client: &mut dyn ProtocolClient,
    path: &str,
) -> Result<RemoteManifest> {
    let entries = client
        .list(path)
        .await
        .map_err(|e| Error::manifest(format!("listing '{}' failed: {e}", display(path))))?;

    let mut manifest = RemoteManifest::new();
    for entry in entries.into_iter().filter(|e| !e.is_navigation()) {
        let child = join_remote(path, &entry.name);
        if entry.is_dir() {
            manifest.push_directory(child.clone());
            manifest.merge(walk(client, child).await);
        } else {
            manifest.push_file(child, entry.size);
        }
    }
    debug!(
        "Listed '{}': {} directories, {} files",
        display(path),
        manifest.directories.len(),
        manifest.files.len()
    );
    Ok(manifest)
}

fn walk(client: &mut dyn ProtocolClient, path: String) -> BoxFuture<'_, RemoteManifest> {
    async move {
        match list_remote_recursive(client, &path).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Skipping unreadable remote directory '{}': {}", path, e);
                RemoteManifest {
                    unreadable: vec![path],
                    ..RemoteManifest::default()
                }
            }
        }
    }
    .boxed()
}

fn display(path: &str) -> &str {
    if path.is_empty() {
        "."
    } else {
        path
    }
}
