//! Connection to the firmware's catalog database.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Location of the catalog, relative to the onboard root.
pub const CATALOG_FILE: &str = ".kobo/KoboReader.sqlite";

/// Handle to Nickel's `KoboReader.sqlite`.
///
/// The schema belongs to the firmware: nothing here migrates, creates or
/// alters firmware tables. A single connection is used so that every read in
/// a session observes the writes made before it, and so there is only ever
/// one writer competing with Nickel.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    async fn new(options: SqliteConnectOptions) -> Result<Self> {
        let filename = options.get_filename().to_path_buf();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Open(filename))?;
        Ok(Self { pool })
    }

    /// Open the catalog below the onboard root.
    ///
    /// A missing database is an error; it is never created.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::connect(root.as_ref().join(CATALOG_FILE)).await
    }

    /// Open the catalog database at the given path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(false);
        Self::new(options).await
    }

    /// Connect to an empty in-memory database.
    ///
    /// Note: do NOT apply `#[cfg(test)]` so that other crates can also use
    /// this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::new(Self::base_options().filename(":memory:")).await
    }

    /// Connection options matching what Nickel itself expects of other
    /// writers.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Nickel may be holding a write lock while it imports books.
            .busy_timeout(Duration::from_millis(2000))
            .foreign_keys(false)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection, waiting for outstanding queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_in_memory() {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        assert!(!catalog.pool().is_closed());
        catalog.close().await;
        assert!(catalog.pool().is_closed());
    }

    #[tokio::test]
    async fn missing_catalog_is_not_created() {
        let root = tempfile::tempdir().unwrap();
        let err = Catalog::open(root.path()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Open(path) if path.ends_with("KoboReader.sqlite")));
        assert!(!root.path().join(CATALOG_FILE).exists());
    }

    #[tokio::test]
    async fn opens_existing_catalog() {
        let root = tempfile::tempdir().unwrap();
        let catalog = crate::fixtures::create(root.path()).await;
        let row: (i64,) = sqlx::query_as("PRAGMA busy_timeout").fetch_one(catalog.pool()).await.unwrap();
        assert_eq!(row.0, 2000);
        catalog.close().await;
    }
}
