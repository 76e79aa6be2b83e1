//! Access to Nickel's content catalog.
//!
//! `KoboReader.sqlite` belongs to the firmware, which keeps writing to it
//! while nickelsync runs. This crate is the only code that touches it: it
//! reads the sideloaded books Nickel has imported, and writes back the few
//! columns Calibre owns (description and series) plus file size corrections.
//! Every other column, and the schema itself, is left alone.

mod db;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod models;
mod repo;
mod series;
pub mod writer;

pub use crate::db::{CATALOG_FILE, Catalog};
pub use crate::models::{CatalogBook, MetadataUpdate, ResolvedUpdate};
pub use crate::repo::Repository;
pub use crate::series::SeriesIdMap;
pub use crate::writer::{ApplyReport, NickelWriter, Strategy};
