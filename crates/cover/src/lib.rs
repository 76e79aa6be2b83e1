//! Cover thumbnails in the layout Nickel's image cache expects.
//!
//! Nickel keeps three pre-rendered JPEGs per book below the volume's image
//! directory, sharded by a hash of the book's image ID. Covers Calibre sends
//! along with a book are rendered here so the library shows real covers as
//! soon as the import finishes.
//!
//! - [`CoverClass`] describes the three covers and their geometry,
//! - [`CoverRenderer`] writes them for one image (blocking),
//! - [`CoverPipeline`] runs renderers in the background and joins them.

mod class;
pub mod error;
mod options;
mod pipeline;
mod render;

pub use crate::class::{CoverClass, Fit, LIBRARY_FULL, LIBRARY_GRID, hashed_dirs, resize_keep_aspect};
pub use crate::options::{CoverOptions, DEFAULT_JPEG_QUALITY, GenerateLevel, ResizeFilter};
pub use crate::pipeline::CoverPipeline;
pub use crate::render::{CoverRenderer, decode_thumbnail};
