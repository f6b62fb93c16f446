//! Local file events delivered by a watcher or editor integration

use std::path::{Path, PathBuf};

/// A change in the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A file was written
    Saved(PathBuf),
    /// A file or directory appeared
    Created(PathBuf),
    /// A file or directory went away
    Deleted(PathBuf),
    /// A file or directory was renamed
    Renamed {
        /// Previous path
        from: PathBuf,
        /// New path
        to: PathBuf,
    },
}

impl FileEvent {
    /// The path the event is about; the new path for renames
    pub fn path(&self) -> &Path {
        match self {
            Self::Saved(path) | Self::Created(path) | Self::Deleted(path) => path,
            Self::Renamed { to, .. } => to,
        }
    }
}
