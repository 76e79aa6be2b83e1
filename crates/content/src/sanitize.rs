//! Lpath sanitization and validation.
//!
//! Calibre happily sends paths containing characters that FAT32 refuses, and
//! paths for kepubs in either their logical (`.kepub`) or on-device
//! (`.kepub.epub`) form. Everything that enters the translator goes through
//! [`sanitize_lpath`] first so that both directions of the translation stay
//! exact inverses of each other.

use regex::Regex;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{ErrorKind, Result};
use crate::{EPUB_SUFFIX, KEPUB_EPUB_SUFFIX};

static INVALID_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[\\?%*:;|"'<>$!]"#).unwrap());

/// Replace characters that are illegal on the device's FAT32 volumes with an
/// underscore.
///
/// ```
/// use nickelsync_content::replace_invalid_chars;
/// assert_eq!(replace_invalid_chars("Who's Afraid?: A Novel.epub"), "Who_s Afraid__ A Novel.epub");
/// assert_eq!(replace_invalid_chars("plain/path.epub"), "plain/path.epub");
/// ```
pub fn replace_invalid_chars(lpath: &str) -> Cow<'_, str> {
    INVALID_CHARS.replace_all(lpath, "_")
}

/// Bring a Calibre-supplied lpath into the canonical form used as the key of
/// every translation.
///
/// - illegal characters become `_`,
/// - leading slashes are dropped,
/// - a kepub given in its on-device form (`x.kepub.epub`) is reduced to its
///   logical form (`x.kepub`).
///
/// Returns [`Cow::Borrowed`] when nothing changed, so callers can tell when
/// the rewritten path must be reported back to Calibre.
pub fn sanitize_lpath(lpath: &str) -> Cow<'_, str> {
    let trimmed = lpath.trim_start_matches('/');
    let mut sanitized = replace_invalid_chars(trimmed);
    if sanitized.ends_with(KEPUB_EPUB_SUFFIX) {
        let len = sanitized.len() - EPUB_SUFFIX.len();
        sanitized.to_mut().truncate(len);
    }
    match sanitized {
        Cow::Borrowed(s) if s.len() != lpath.len() => Cow::Owned(s.to_string()),
        other => other,
    }
}

/// Validates a relative path below a volume root.
///
/// Resolves `.` and `..` components and rejects anything that would leave the
/// root, contains a null byte, or is empty once resolved.
pub fn validate_relative(path: impl AsRef<Path>) -> Result<PathBuf> {
    let invalid = || ErrorKind::InvalidPath(path.as_ref().to_string_lossy().into_owned());
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::EmptyPath),
        false => Ok(components.into_iter().collect()),
    }
}
