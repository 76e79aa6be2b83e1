//! Device Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A device identification error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for device identification.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The firmware version file could not be read. Not a Kobo, or the
    /// volume is not mounted.
    #[display("could not read firmware version file: {}", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
    /// The version file exists but does not have the expected layout.
    #[display("malformed firmware version file: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The model ID is not one we have cover geometry for.
    #[display("unknown device model: {_0}")]
    UnknownModel(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreadable(_))
    }
}
