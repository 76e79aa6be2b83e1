//! Cover Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

use crate::CoverClass;

/// A cover generation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cover generation.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The thumbnail sent by Calibre is not valid base64 or not an image.
    /// Don't retry with the same input.
    #[display("invalid thumbnail data")]
    InvalidThumbnail,
    /// Resizing or JPEG encoding failed.
    #[display("failed to encode {_0} cover")]
    Encode(#[error(not(source))] CoverClass),
    /// Creating the shard directories or writing the file failed.
    #[display("failed to write cover: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// An option value was not recognised.
    #[display("invalid cover option: {_0}")]
    InvalidOption(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
