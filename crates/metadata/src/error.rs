//! Metadata Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A file could not be read or written.
    #[display("could not access {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A JSON file exists but isn't what Calibre or nickelsync wrote.
    #[display("malformed JSON in {}", _0.display())]
    MalformedJson(#[error(not(source))] PathBuf),
    /// A book file isn't a readable EPUB. Its metadata has to come from
    /// elsewhere.
    #[display("not a readable EPUB: {}", _0.display())]
    InvalidEpub(#[error(not(source))] PathBuf),
    /// The catalog couldn't be read. Fatal for the session.
    #[display("could not read the catalog")]
    Catalog,
    /// A record's lpath can't be mapped to a book on the active volume.
    #[display("invalid lpath: {_0}")]
    InvalidLpath(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Catalog)
    }
}
