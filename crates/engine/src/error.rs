//! Engine Error Types
//!
//! Errors from the lower crates are wrapped in the kind that tells the
//! session's driver what to do about them.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The device couldn't be identified. Fatal for the session.
    #[display("could not identify the device")]
    Device,
    /// The catalog couldn't be opened or read. Fatal for the session.
    #[display("catalog unavailable")]
    Catalog,
    /// Calibre's metadata files couldn't be read or written.
    #[display("could not access Calibre metadata")]
    Metadata,
    /// A book file couldn't be created, opened or removed.
    #[display("could not access {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// Calibre asked for a book that isn't on the device.
    #[display("no such book: {_0}")]
    UnknownBook(#[error(not(source))] String),
    /// Calibre sent an lpath that can't be stored on the active volume.
    #[display("invalid lpath: {_0}")]
    InvalidLpath(#[error(not(source))] String),
    /// Writing metadata to the catalog failed. Nothing was written, and the
    /// dirty set still holds every pending book.
    #[display("could not write metadata to the catalog")]
    Flush,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Flush)
    }
}
