//! Error types for the descriptor bridge
//!
//! Every fallible entry point (view creation, heap allocation, descriptor
//! writes) reports one of these variants. Low-level backend failures are
//! wrapped at the call site and never retried.

use std::fmt;

/// Result type for descriptor bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Descriptor bridge errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed description (unaligned size, wrong view dimension, bad flags)
    InvalidArgument(String),

    /// Host or device allocation failed (includes heap size overflow)
    OutOfMemory,

    /// Requested view/format/flag combination is not available on this device
    NotImplemented(String),

    /// A low-level device call returned an error code
    DeviceCallFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::DeviceCallFailed(msg) => write!(f, "Device call failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Log an error with file:line and evaluate to the matching `Error` variant
///
/// # Example
///
/// ```no_run
/// # use descriptor_bridge::bridge_err;
/// let err = bridge_err!(InvalidArgument, "bridge::descriptor", "bad size {}", 255);
/// ```
#[macro_export]
macro_rules! bridge_err {
    ($variant:ident, $source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::bridge_error!($source, "{}", message);
        $crate::bridge::Error::$variant(message)
    }};
}

/// Log an error and return it from the enclosing function
#[macro_export]
macro_rules! bridge_bail {
    ($variant:ident, $source:expr, $($arg:tt)*) => {
        return Err($crate::bridge_err!($variant, $source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
