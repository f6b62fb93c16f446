//! Protocol clients and session management for FerroMirror
//!
//! This crate provides the wire side of the mirror:
//!
//! - **FTP / FTPS**: control connection with multi-line replies, passive data
//!   channels, explicit TLS via `AUTH TLS`, MLSD and `LIST` parsing
//! - **SFTP**: libssh2 session with password authentication
//! - **Client factory**: the single protocol-tag dispatch point
//! - **Connection manager**: single-session reuse, liveness probing and reconnect
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferromirror_network::{ConnectionManager, DefaultClientFactory};
//! use ferromirror_types::{ConnectionConfig, Protocol};
//! use std::sync::Arc;
//!
//! # async fn example() -> ferromirror_types::Result<()> {
//! let mut manager = ConnectionManager::new(Arc::new(DefaultClientFactory::default()));
//! let config = ConnectionConfig::new(Protocol::Sftp, "example.com", "deploy", "secret", "/var/www");
//! manager.connect(config).await?;
//!
//! let entries = manager.client_mut()?.list("").await?;
//! println!("{} entries in the remote root", entries.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod connection;
pub mod factory;
pub mod ftp;
pub mod remote;
pub mod sftp;

pub use connection::{ConnectionManager, ConnectionState, ConnectionStats};
pub use factory::{ClientFactory, DefaultClientFactory};
pub use ftp::FtpClient;
pub use sftp::SftpClient;
