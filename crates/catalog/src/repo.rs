//! Reads and single-row corrections against the `content` table.

use exn::ResultExt;
use nickelsync_content::ContentId;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::Catalog;
use crate::error::{ErrorKind, Result};
use crate::models::{BookRow, CatalogBook};
use crate::series::SeriesIdMap;

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Catalog> for Repository {
    fn from(catalog: &Catalog) -> Self {
        Self { pool: catalog.pool().clone() }
    }
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Every sideloaded book Nickel has fully imported on the volume with the
    /// given content ID prefix, in content ID order.
    #[instrument(skip(self))]
    pub async fn books(&self, prefix: &str) -> Result<Vec<CatalogBook>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/books_with_prefix.sql"))
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let books = rows.into_iter().map(CatalogBook::try_from).collect::<Result<Vec<_>>>()?;
        tracing::debug!(count = books.len(), "read books from catalog");
        Ok(books)
    }

    /// The size Nickel has on record for a book, if it has imported it.
    pub async fn file_size(&self, content_id: &ContentId) -> Result<Option<u64>> {
        let size: Option<Option<i64>> = sqlx::query_scalar(include_str!("../queries/file_size.sql"))
            .bind(content_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        size.flatten()
            .map(|size| u64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size")))
            .transpose()
    }

    /// Build the series grouping key map from the store books in the catalog.
    #[instrument(skip(self))]
    pub async fn series_ids(&self) -> Result<SeriesIdMap> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let map = SeriesIdMap::load(&mut conn).await?;
        tracing::debug!(series = map.len(), "loaded series grouping keys");
        Ok(map)
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Overwrite the size Nickel has on record for a book.
    ///
    /// Returns `false` if the book isn't in the catalog.
    #[instrument(skip(self), fields(%content_id))]
    pub async fn set_file_size(&self, content_id: &ContentId, size: u64) -> Result<bool> {
        let size = i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))?;
        let result = sqlx::query(include_str!("../queries/update_file_size.sql"))
            .bind(size)
            .bind(content_id.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
