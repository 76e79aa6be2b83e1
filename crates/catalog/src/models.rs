use exn::ResultExt;
use nickelsync_content::ContentId;

use crate::error::{Error, ErrorKind};
use crate::series::SeriesIdMap;

/// A book row, as returned by the reconciliation query.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookRow {
    content_id: String,
    title: Option<String>,
    attribution: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    series: Option<String>,
    series_number: Option<String>,
    mime_type: Option<String>,
    file_size: i64,
}

/// A sideloaded book that Nickel has imported, with whatever metadata Nickel
/// extracted from it. Empty strings are treated as absent.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogBook {
    pub content_id: ContentId,
    pub title: Option<String>,
    /// `Attribution`, split on commas.
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
    pub mime_type: Option<String>,
    /// `___FileSize`: what Nickel believes the file's size is.
    pub size: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl TryFrom<BookRow> for CatalogBook {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let authors = non_empty(row.attribution)
            .map(|a| a.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        Ok(Self {
            content_id: ContentId::new(row.content_id),
            title: non_empty(row.title),
            authors,
            description: non_empty(row.description),
            publisher: non_empty(row.publisher),
            series: non_empty(row.series),
            series_index: non_empty(row.series_number).and_then(|n| n.trim().parse().ok()),
            mime_type: non_empty(row.mime_type),
            size: u64::try_from(row.file_size).or_raise(|| ErrorKind::InvalidData("file size"))?,
        })
    }
}

/// The catalog columns nickelsync owns for a book.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataUpdate {
    pub content_id: ContentId,
    pub description: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
}

impl MetadataUpdate {
    /// Empty descriptions and series, and a zero series index, count as unset.
    pub fn new(
        content_id: ContentId,
        description: Option<String>,
        series: Option<String>,
        series_index: Option<f64>,
    ) -> Self {
        Self {
            content_id,
            description: description.filter(|s| !s.is_empty()),
            series: series.filter(|s| !s.is_empty()),
            series_index: series_index.filter(|i| *i != 0.0 && i.is_finite()),
        }
    }

    /// Compute the column values, resolving the series grouping key.
    pub fn resolve(&self, series_ids: &SeriesIdMap) -> ResolvedUpdate {
        ResolvedUpdate {
            content_id: self.content_id.clone(),
            description: self.description.clone(),
            series: self.series.clone(),
            series_number: self.series_index.map(format_series_number),
            series_number_float: self.series_index,
            series_id: self.series.as_deref().map(|s| series_ids.resolve(s).to_string()),
        }
    }
}

/// Column values for one book, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedUpdate {
    pub content_id: ContentId,
    pub description: Option<String>,
    pub series: Option<String>,
    /// Display form of the index, e.g. `2` or `2.5`.
    pub series_number: Option<String>,
    pub series_number_float: Option<f64>,
    pub series_id: Option<String>,
}

/// Shortest decimal form, never in exponent notation.
pub(crate) fn format_series_number(index: f64) -> String {
    format!("{index}")
}
