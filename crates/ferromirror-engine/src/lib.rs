//! Mirror engine for FerroMirror
//!
//! This crate ties the FerroMirror components together: it owns the single
//! protocol session, serializes remote changes through the transfer queue and
//! drives the initial pull of the remote tree.
//!
//! # Features
//!
//! - **Single session**: one connection manager shared by the queue and sync
//! - **Transfer queue**: FIFO worker with deduplication and bounded retries
//! - **Event handling**: save, create, delete and rename events map to transfers
//! - **Initial sync**: cancellable pull of the remote tree with exclude patterns
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferromirror_engine::{FileEvent, SyncEngine};
//!
//! # async fn example() -> ferromirror_types::Result<()> {
//! let engine = SyncEngine::builder("/home/me/site").build().await?;
//! engine.connect().await?;
//! engine
//!     .handle_event(FileEvent::Saved("/home/me/site/index.html".into()))
//!     .await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod events;
pub mod queue;
pub mod task;

pub use engine::{EngineBuilder, SyncEngine};
pub use events::FileEvent;
pub use queue::{TransferQueue, WorkerContext};
pub use task::{QueueItem, TaskId, TransferOp, TransferOutcome};
