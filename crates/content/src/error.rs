//! Content Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A content translation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for content translation.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The content ID does not live on the volume described by the prefix.
    /// Usually a book on the other storage volume; skip it.
    #[display("content ID {_0:?} does not start with prefix {_1:?}")]
    ForeignPrefix(#[error(not(source))] String, #[error(not(source))] String),
    /// Nothing is left once the prefix (and any leading slash) is removed.
    #[display("empty lpath")]
    EmptyPath,
    /// The lpath would escape the volume root.
    #[display("invalid lpath: {_0}")]
    InvalidPath(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
