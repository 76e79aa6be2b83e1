//! The session's view of which books are on the device, and what Calibre
//! knows about them.
//!
//! Calibre keeps its own metadata cache on the device (`metadata.calibre`).
//! Nickel keeps the catalog. Neither is authoritative on its own: books can
//! be added or removed over USB without Calibre noticing, and Nickel may not
//! have imported a book Calibre just sent. [`MetadataStore::reconcile`]
//! merges the two at the start of every session.

mod epub;
pub mod error;
mod files;
mod json;
mod record;
mod store;

pub use crate::epub::{EPUB_MIME_TYPES, EpubMetadata};
pub use crate::files::{DIRTY_FILE, DRIVEINFO_FILE, DirtySet, DriveInfo, METADATA_FILE};
pub use crate::record::{BookRecord, Thumbnail, format_timestamp, new_uuid, parse_opf_date};
pub use crate::store::MetadataStore;
