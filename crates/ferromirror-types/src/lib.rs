//! Core types, error handling and contracts for FerroMirror
//!
//! This crate provides the foundational pieces shared by every FerroMirror
//! crate:
//!
//! - **Error handling**: one error enum with transient-failure classification
//! - **Core types**: connection settings, listing entries, remote manifests
//! - **Path mapping**: pure local/remote path translation
//! - **Traits**: the protocol client contract and the notifier/logger collaborators
//!
//! # Examples
//!
//! ```rust
//! use ferromirror_types::path::{directory_of, to_remote};
//! use std::path::Path;
//!
//! let remote = to_remote("/ws/src/index.ts", Some(Path::new("/ws")));
//! assert_eq!(remote.as_deref(), Some("src/index.ts"));
//! assert_eq!(directory_of("src/index.ts"), "src");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod path;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{RetryPolicy, TimeoutConfig};
pub use error::{Error, ErrorKind, TransientCause};
pub use result::Result;
pub use traits::*;
pub use types::*;
