//! Content address translation.
//!
//! Calibre identifies a book by its `lpath`, a path relative to the root of
//! the storage volume. Nickel (the Kobo firmware) identifies the same book by
//! a content ID: a `file://` URI built from the volume's mount point and that
//! same relative path. Kepubs are the exception, because Nickel only opens
//! them when they carry an extra `.epub` suffix.
//!
//! Everything in this crate is pure string manipulation. The prefix is
//! treated as an opaque string; the only thing ever done with it is exact
//! prefix matching.

pub mod error;
mod id;
mod sanitize;

pub use crate::id::{ContentId, image_id, to_content_id, to_filesystem_path, to_lpath};
pub use crate::sanitize::{replace_invalid_chars, sanitize_lpath, validate_relative};

/// Suffix Calibre uses for Kobo's own EPUB flavour.
pub const KEPUB_SUFFIX: &str = ".kepub";
/// Suffix Nickel requires on every EPUB container, kepubs included.
pub const EPUB_SUFFIX: &str = ".epub";
/// What a kepub is actually named on the device.
pub const KEPUB_EPUB_SUFFIX: &str = ".kepub.epub";

/// Content ID prefix of books on internal storage.
pub const ONBOARD_PREFIX: &str = "file:///mnt/onboard/";
/// Content ID prefix of books on the removable SD card.
pub const SD_PREFIX: &str = "file:///mnt/sd/";

/// Returns `true` if the lpath names a kepub in its logical form.
pub fn lpath_is_kepub(lpath: &str) -> bool {
    lpath.ends_with(KEPUB_SUFFIX)
}

/// A physical storage volume on the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Volume {
    /// Internal storage, mounted at `/mnt/onboard`.
    #[default]
    Onboard,
    /// Removable storage, mounted at `/mnt/sd`.
    Sd,
}

impl Volume {
    /// Pick the volume for this session.
    ///
    /// The SD card is only used when the user asked for it *and* one is
    /// actually mounted.
    pub fn select(prefer_sd: bool, sd_present: bool) -> Self {
        match prefer_sd && sd_present {
            true => Self::Sd,
            false => Self::Onboard,
        }
    }

    /// The content ID prefix of books stored on this volume.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Onboard => ONBOARD_PREFIX,
            Self::Sd => SD_PREFIX,
        }
    }

    /// Calibre's location code for the volume (`"main"` or card `"A"`).
    pub const fn location_code(self) -> &'static str {
        match self {
            Self::Onboard => "main",
            Self::Sd => "A",
        }
    }

    /// Directory (relative to the volume root) where Nickel looks for
    /// pre-rendered cover images.
    pub const fn image_dir(self) -> &'static str {
        match self {
            Self::Onboard => ".kobo-images",
            Self::Sd => "koboExtStorage/images-cache",
        }
    }
}
