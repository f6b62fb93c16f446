//! Mapping between local workspace paths and remote-relative paths
//!
//! All functions here are pure. Remote-relative paths never start with a slash
//! and always use `/` as separator; they are resolved against the session's
//! remote root by the protocol clients.

use std::path::{Path, PathBuf};

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Map a local path to its remote-relative counterpart.
///
/// Returns `None` when the workspace root is unknown, when `local_path` is not
/// inside it, or when the remainder would climb out of it with `..`.
pub fn to_remote(local_path: impl AsRef<Path>, workspace_root: Option<&Path>) -> Option<String> {
    let root = normalize_separators(&workspace_root?.to_string_lossy());
    if root.is_empty() {
        return None;
    }
    let local = normalize_separators(&local_path.as_ref().to_string_lossy());

    let rest = local.strip_prefix(root.trim_end_matches('/'))?;
    // "/ws2/a" must not match root "/ws"
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }

    let mut segments = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Resolve a remote-relative path back into the workspace
pub fn to_local(remote_path: &str, workspace_root: &Path) -> PathBuf {
    remote_path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .fold(workspace_root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Directory part of a remote path, `"."` for top-level entries
pub fn directory_of(remote_path: &str) -> &str {
    match remote_path.rfind('/') {
        None | Some(0) => ".",
        Some(index) => &remote_path[..index],
    }
}

/// Last path component, accepting either separator
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Join a remote directory and an entry name
pub fn join_remote(directory: &str, name: &str) -> String {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() || directory == "." {
        name.to_string()
    } else {
        format!("{directory}/{name}")
    }
}
