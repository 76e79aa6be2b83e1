use derive_more::Display;
use exn::OptionExt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::{EPUB_SUFFIX, KEPUB_EPUB_SUFFIX, lpath_is_kepub, validate_relative};

/// Nickel's identifier for a row in the `content` table.
///
/// Always `<prefix><relative path>`, see [`to_content_id`].
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a content ID read back from the catalog or from disk.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns `true` if the content ID lives on the volume with this prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Translate a Calibre lpath into a content ID.
///
/// A leading slash on the lpath is ignored and kepubs gain their `.epub`
/// suffix. The lpath is expected to have been through
/// [`sanitize_lpath`](crate::sanitize_lpath) already.
///
/// ```
/// use nickelsync_content::{to_content_id, ONBOARD_PREFIX};
/// assert_eq!(to_content_id("A/B.epub", ONBOARD_PREFIX).as_str(), "file:///mnt/onboard/A/B.epub");
/// assert_eq!(to_content_id("/A/B.kepub", ONBOARD_PREFIX).as_str(), "file:///mnt/onboard/A/B.kepub.epub");
/// ```
pub fn to_content_id(lpath: &str, prefix: &str) -> ContentId {
    let lpath = lpath.trim_start_matches('/');
    let mut id = String::with_capacity(prefix.len() + lpath.len() + EPUB_SUFFIX.len());
    id.push_str(prefix);
    id.push_str(lpath);
    if lpath_is_kepub(lpath) {
        id.push_str(EPUB_SUFFIX);
    }
    ContentId(id)
}

/// Translate a content ID back into the lpath Calibre knows it by.
///
/// Exactly one `.epub` is stripped, and only from a `.kepub.epub` ID.
pub fn to_lpath(content_id: &ContentId, prefix: &str) -> Result<String> {
    let relative = strip_prefix(content_id, prefix)?;
    let lpath = match relative.strip_suffix(EPUB_SUFFIX) {
        Some(stem) if relative.ends_with(KEPUB_EPUB_SUFFIX) => stem,
        _ => relative,
    };
    Ok(lpath.to_string())
}

/// Absolute path of the book file for a content ID, below the mount point of
/// the volume the prefix belongs to.
pub fn to_filesystem_path(root: impl AsRef<Path>, content_id: &ContentId, prefix: &str) -> Result<PathBuf> {
    let relative = validate_relative(strip_prefix(content_id, prefix)?)?;
    Ok(root.as_ref().join(relative))
}

/// Nickel's image ID for a content ID: every `/`, space, `:` and `.`
/// replaced with `_`.
///
/// ```
/// use nickelsync_content::{image_id, ContentId};
/// let id = ContentId::new("file:///mnt/onboard/.kobo/guide/userguide.pdf");
/// assert_eq!(image_id(&id), "file____mnt_onboard__kobo_guide_userguide_pdf");
/// ```
pub fn image_id(content_id: &ContentId) -> String {
    content_id.as_str().replace(['/', ' ', ':', '.'], "_")
}

fn strip_prefix<'a>(content_id: &'a ContentId, prefix: &str) -> Result<&'a str> {
    let relative = content_id
        .as_str()
        .strip_prefix(prefix)
        .ok_or_raise(|| ErrorKind::ForeignPrefix(content_id.to_string(), prefix.to_string()))?;
    match relative.trim_start_matches('/') {
        "" => exn::bail!(ErrorKind::EmptyPath),
        relative => Ok(relative),
    }
}
