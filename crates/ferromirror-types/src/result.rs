//! Result type alias for FerroMirror operations

use crate::Error;

/// Result type alias for FerroMirror operations
pub type Result<T> = std::result::Result<T, Error>;
