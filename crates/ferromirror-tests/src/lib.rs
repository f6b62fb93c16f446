//! FerroMirror test support
//!
//! This crate provides an in-memory remote server, a protocol client and
//! client factory backed by it, and recording collaborators, so the engine can
//! be driven end to end without a network. Integration tests live in `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// In-memory remote server with failure injection
pub mod mock_server;

/// Protocol client and factory backed by the mock server
pub mod mock_client;

/// Notifier and logger that record calls
pub mod recording;

/// Engine harness and workspace helpers
pub mod test_utils;

pub use mock_client::{MockClient, MockClientFactory};
pub use mock_server::{MockOp, MockServer, Node};
pub use recording::{MemoryLogger, Notification, RecordingNotifier};
pub use test_utils::{complete_settings, write_file, Harness};
