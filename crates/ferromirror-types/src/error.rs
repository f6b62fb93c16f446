//! Error types and handling for FerroMirror
//!
//! Every fallible operation in the workspace returns [`Error`]. Besides the
//! usual kind tagging, errors can be classified as *transient*: network-layer
//! failures (socket reset, timeout, hang-up, lost session) that the transfer
//! queue is allowed to retry after discarding the session.

use std::path::PathBuf;

/// Main error type for FerroMirror operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Required connection settings are missing
    #[error("Connection settings incomplete, missing: {}", .missing.join(", "))]
    ConfigIncomplete {
        /// Names of the missing settings
        missing: Vec<String>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Establishing a session failed
    #[error("Connection failed: {message}")]
    Connection {
        /// Error message describing the connection failure
        message: String,
    },

    /// An operation was attempted without a live session
    #[error("Not connected to the remote server")]
    NotConnected,

    /// Network error on an established session
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Operation timed out in the transport
    #[error("Operation timed out: {message}")]
    Timeout {
        /// Error message describing what timed out
        message: String,
    },

    /// The server rejected a command
    #[error("Server error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Protocol {
        /// Protocol reply or status code, when the server sent one
        code: Option<u32>,
        /// Server supplied text
        message: String,
    },

    /// Local path lies outside the workspace root
    #[error("Path is outside the workspace: {path}")]
    PathOutOfScope {
        /// Offending local path
        path: PathBuf,
    },

    /// The remote listing for a sync could not be obtained
    #[error("Failed to read remote tree: {message}")]
    Manifest {
        /// Error message describing the listing failure
        message: String,
    },

    /// A transfer kept failing transiently until the retry budget ran out
    #[error("Gave up after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Message of the last failure
        message: String,
    },

    /// An operation for the same key is already queued or in flight
    #[error("Operation already in progress: {key}")]
    AlreadyQueued {
        /// Deduplication key
        key: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors
    Io,
    /// Configuration errors, including incomplete settings
    Config,
    /// Session establishment errors
    Connection,
    /// Network and timeout errors on a live session
    Network,
    /// Server side rejections
    Protocol,
    /// Paths that cannot be mapped
    Path,
    /// Remote listing errors
    Manifest,
    /// Transfer given up
    Transfer,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

/// Why an error counts as transient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientCause {
    /// The peer reset the connection
    Reset,
    /// The transport timed out
    Timeout,
    /// The peer hung up or the pipe broke
    HangUp,
    /// The session was gone when the operation started
    NotConnected,
}

const RESET_MARKERS: &[&str] = &["econnreset", "connection reset", "reset by peer", "connection aborted"];
const TIMEOUT_MARKERS: &[&str] = &["etimedout", "timed out", "timeout"];
const HANGUP_MARKERS: &[&str] = &[
    "hang up",
    "hangup",
    "broken pipe",
    "epipe",
    "unexpected eof",
    "connection closed",
    "closed connection",
    "closing control connection",
];
const NOT_CONNECTED_MARKERS: &[&str] = &["not connected", "enotconn", "no session"];

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::ConfigIncomplete { .. } | Self::Config { .. } => ErrorKind::Config,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::NotConnected | Self::Network { .. } | Self::Timeout { .. } => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::PathOutOfScope { .. } => ErrorKind::Path,
            Self::Manifest { .. } => ErrorKind::Manifest,
            Self::RetriesExhausted { .. } | Self::AlreadyQueued { .. } => ErrorKind::Transfer,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Classify the error as transient, if it is one.
    ///
    /// Structured variants are checked first; free-form messages coming from
    /// lower layers are matched against known socket failure categories.
    pub fn transient_cause(&self) -> Option<TransientCause> {
        match self {
            Self::NotConnected => Some(TransientCause::NotConnected),
            Self::Timeout { .. } => Some(TransientCause::Timeout),
            Self::Network { message } | Self::Io { message } | Self::Other { message } => {
                classify_message(message)
            }
            // 421 is the FTP "service closing control connection" reply
            Self::Protocol { code: Some(421), .. } => Some(TransientCause::HangUp),
            Self::Protocol { message, .. } => classify_message(message),
            _ => None,
        }
    }

    /// Check if this error should trigger a retry with a fresh session
    pub fn is_transient(&self) -> bool {
        self.transient_cause().is_some()
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new server rejection error
    pub fn protocol<S: Into<String>>(code: Option<u32>, message: S) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Create a new manifest error
    pub fn manifest<S: Into<String>>(message: S) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

fn classify_message(message: &str) -> Option<TransientCause> {
    let lower = message.to_ascii_lowercase();
    let hit = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
    if hit(RESET_MARKERS) {
        Some(TransientCause::Reset)
    } else if hit(TIMEOUT_MARKERS) {
        Some(TransientCause::Timeout)
    } else if hit(HANGUP_MARKERS) {
        Some(TransientCause::HangUp)
    } else if hit(NOT_CONNECTED_MARKERS) {
        Some(TransientCause::NotConnected)
    } else {
        None
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match error.kind() {
            Io::ConnectionReset | Io::ConnectionAborted => Self::Network {
                message: format!("connection reset: {error}"),
            },
            Io::TimedOut => Self::Timeout {
                message: error.to_string(),
            },
            Io::BrokenPipe | Io::UnexpectedEof => Self::Network {
                message: format!("socket hang up: {error}"),
            },
            Io::NotConnected => Self::NotConnected,
            _ => Self::Io {
                message: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(std::io::ErrorKind::ConnectionReset, Some(TransientCause::Reset))]
    #[case(std::io::ErrorKind::TimedOut, Some(TransientCause::Timeout))]
    #[case(std::io::ErrorKind::BrokenPipe, Some(TransientCause::HangUp))]
    #[case(std::io::ErrorKind::UnexpectedEof, Some(TransientCause::HangUp))]
    #[case(std::io::ErrorKind::NotConnected, Some(TransientCause::NotConnected))]
    #[case(std::io::ErrorKind::PermissionDenied, None)]
    #[case(std::io::ErrorKind::NotFound, None)]
    fn test_io_error_classification(
        #[case] kind: std::io::ErrorKind,
        #[case] expected: Option<TransientCause>,
    ) {
        let error = Error::from(std::io::Error::new(kind, "boom"));
        assert_eq!(error.transient_cause(), expected);
    }

    #[rstest]
    #[case("read ECONNRESET", Some(TransientCause::Reset))]
    #[case("Timeout (control socket)", Some(TransientCause::Timeout))]
    #[case("socket hang up", Some(TransientCause::HangUp))]
    #[case("Client is not connected", Some(TransientCause::NotConnected))]
    #[case("550 Permission denied", None)]
    fn test_message_classification(#[case] message: &str, #[case] expected: Option<TransientCause>) {
        assert_eq!(Error::network(message).transient_cause(), expected);
    }

    #[test]
    fn test_structured_variants() {
        assert!(Error::NotConnected.is_transient());
        assert!(Error::protocol(Some(421), "Service not available").is_transient());
        assert!(!Error::protocol(Some(550), "No such file").is_transient());
        assert!(!Error::connection("530 Login incorrect").is_transient());
        assert!(!Error::ConfigIncomplete {
            missing: vec!["host".to_string()]
        }
        .is_transient());
    }

    #[test]
    fn test_display() {
        let error = Error::ConfigIncomplete {
            missing: vec!["host".to_string(), "password".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Connection settings incomplete, missing: host, password"
        );
        assert_eq!(
            Error::protocol(Some(550), "No such file").to_string(),
            "Server error 550: No such file"
        );
        assert_eq!(Error::protocol(None, "denied").to_string(), "Server error: denied");
    }

    proptest! {
        #[test]
        fn test_kind_is_total(message in ".*") {
            let errors = vec![
                Error::Io { message: message.clone() },
                Error::Config { message: message.clone() },
                Error::Network { message: message.clone() },
                Error::Manifest { message: message.clone() },
                Error::Other { message: message.clone() },
            ];
            for error in errors {
                match error {
                    Error::Io { .. } => prop_assert_eq!(error.kind(), ErrorKind::Io),
                    Error::Config { .. } => prop_assert_eq!(error.kind(), ErrorKind::Config),
                    Error::Network { .. } => prop_assert_eq!(error.kind(), ErrorKind::Network),
                    Error::Manifest { .. } => prop_assert_eq!(error.kind(), ErrorKind::Manifest),
                    _ => prop_assert_eq!(error.kind(), ErrorKind::Other),
                }
            }
        }

        #[test]
        fn test_config_errors_never_transient(message in "[a-z ]*") {
            prop_assert!(!Error::config(message).is_transient());
        }
    }
}
