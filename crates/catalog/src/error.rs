//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The catalog could not be opened. Fatal for the session.
    #[display("could not open catalog: {}", _0.display())]
    Open(#[error(not(source))] PathBuf),
    /// A query failed. Any enclosing transaction has been rolled back.
    #[display("catalog query failed")]
    Database,
    /// A row held a value that doesn't fit the expected type.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Reading, writing or removing the deferred update script failed.
    #[display("could not access deferred update script: {}", _0.display())]
    Script(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Writes are transactional and idempotent, so a failed flush can always
    /// be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Script(_))
    }
}
