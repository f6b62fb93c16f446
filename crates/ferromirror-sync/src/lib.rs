//! Remote tree synchronization for FerroMirror
//!
//! This crate turns a live protocol session into a mirrored local workspace:
//!
//! - **Manifest**: depth-first recursive listing, directories before their contents
//! - **Exclude filter**: case-sensitive glob patterns applied to every path prefix
//! - **Initial sync**: create local directories, then download files, with
//!   progress, cancellation and per-item failure isolation
//! - **Moves**: server-side rename with a download/upload/delete fallback
//! - **Push planning**: local directory walk into mkdir and upload steps
//!
//! # Examples
//!
//! ```rust
//! use ferromirror_sync::ExcludeFilter;
//!
//! let filter = ExcludeFilter::new(&[".git", "node_modules"]).unwrap();
//! assert!(filter.is_excluded("node_modules/left-pad/index.js"));
//! assert!(!filter.is_excluded("src/index.js"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod exclude;
pub mod manifest;
pub mod progress;
pub mod push;
pub mod tree;

pub use exclude::ExcludeFilter;
pub use manifest::list_remote_recursive;
pub use progress::{ProgressTracker, SyncPhase, SyncProgress};
pub use push::{plan_push, PushStep};
pub use tree::{move_file, MoveStrategy, SyncFailure, SyncReport, TreeSynchronizer};
