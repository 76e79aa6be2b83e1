//! What the session tells Calibre about itself.

use nickelsync_device::Size;
use time::OffsetDateTime;

/// Formats offered to Calibre, most preferred first.
const EXTENSIONS: [&str; 9] = ["epub", "kepub", "mobi", "pdf", "cbz", "cbr", "txt", "html", "rtf"];

/// The device capabilities announced when Calibre connects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    pub extensions: Vec<&'static str>,
    /// e.g. `Kobo Clara HD`.
    pub device_model: String,
    /// Size of the thumbnails Calibre should send with each book.
    pub cover_size: Size,
}

impl ClientOptions {
    pub(crate) fn extensions(prefer_kepub: bool) -> Vec<&'static str> {
        let mut extensions = EXTENSIONS.to_vec();
        if prefer_kepub {
            extensions.swap(0, 1);
        }
        extensions
    }
}

/// One entry of the book list sent to Calibre.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookListing {
    pub uuid: String,
    pub lpath: String,
    pub last_modified: OffsetDateTime,
    /// With its dot, e.g. `.epub`.
    pub extension: String,
}

/// The configured passwords, each offered at most once per session.
#[derive(Clone, Debug, Default)]
pub(crate) struct Passwords {
    list: Vec<String>,
    tried: usize,
}

impl Passwords {
    pub(crate) fn new(list: Vec<String>) -> Self {
        Self { list, tried: 0 }
    }

    pub(crate) fn next_password(&mut self) -> Option<&str> {
        let password = self.list.get(self.tried)?;
        self.tried += 1;
        Some(password)
    }
}
