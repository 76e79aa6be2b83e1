//! Test helpers for building a catalog that looks like Nickel's.
//!
//! Panics freely; only meant for tests.

use nickelsync_content::{ONBOARD_PREFIX, to_content_id};
use sqlx::sqlite::SqliteConnectOptions;
use std::path::Path;

use crate::{CATALOG_FILE, Catalog};

/// Schema of the `content` columns nickelsync touches.
pub const SCHEMA: &str = include_str!("../tests/fixtures/content.sql");

/// Create the `content` table.
pub async fn seed(catalog: &Catalog) {
    sqlx::raw_sql(SCHEMA).execute(catalog.pool()).await.unwrap();
}

/// Create a seeded catalog file below `root`, where [`Catalog::open`] looks
/// for it.
pub async fn create(root: &Path) -> Catalog {
    let path = root.join(CATALOG_FILE);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
    sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();
    pool.close().await;
    Catalog::open(root).await.unwrap()
}

/// A `content` row for a book.
#[derive(Clone, Debug)]
pub struct TestBook {
    pub content_id: String,
    pub image_id: String,
    pub mime_type: String,
    pub title: Option<String>,
    pub attribution: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub series_id: Option<String>,
    pub series_number: Option<String>,
    pub file_size: i64,
    pub accessibility: i64,
}

impl TestBook {
    /// A book bought from the Kobo store.
    pub fn store(content_id: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
            image_id: content_id.to_string(),
            mime_type: "application/x-kobo-epub+zip".to_string(),
            title: Some("Store Book".to_string()),
            attribution: None,
            description: None,
            publisher: None,
            series: None,
            series_id: None,
            series_number: None,
            file_size: 4096,
            accessibility: 1,
        }
    }

    /// A sideloaded book on the onboard volume, by lpath.
    pub fn sideloaded(lpath: &str) -> Self {
        let content_id = to_content_id(lpath, ONBOARD_PREFIX);
        Self {
            image_id: nickelsync_content::image_id(&content_id),
            content_id: content_id.into_inner(),
            mime_type: "application/epub+zip".to_string(),
            accessibility: -1,
            title: Some(lpath.to_string()),
            ..Self::store("")
        }
    }

    pub fn series(mut self, series: &str, series_id: Option<&str>) -> Self {
        self.series = Some(series.to_string());
        self.series_id = series_id.map(String::from);
        self
    }

    pub fn size(mut self, file_size: i64) -> Self {
        self.file_size = file_size;
        self
    }

    pub fn mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = mime_type.to_string();
        self
    }
}

/// Insert a book row, as Nickel does when it imports a file.
pub async fn insert(catalog: &Catalog, book: &TestBook) {
    sqlx::query(
        "INSERT INTO content (ContentID, ContentType, MimeType, ImageId, Title, Attribution, Description,
            Publisher, IsDownloaded, ___FileSize, Accessibility, Series, SeriesNumber, SeriesID)
         VALUES (?, 6, ?, ?, ?, ?, ?, ?, 'true', ?, ?, ?, ?, ?)",
    )
    .bind(&book.content_id)
    .bind(&book.mime_type)
    .bind(&book.image_id)
    .bind(&book.title)
    .bind(&book.attribution)
    .bind(&book.description)
    .bind(&book.publisher)
    .bind(book.file_size)
    .bind(book.accessibility)
    .bind(&book.series)
    .bind(&book.series_number)
    .bind(&book.series_id)
    .execute(catalog.pool())
    .await
    .unwrap();
}

/// The columns nickelsync writes, for one book.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct WrittenColumns {
    #[sqlx(rename = "Description")]
    pub description: Option<String>,
    #[sqlx(rename = "Series")]
    pub series: Option<String>,
    #[sqlx(rename = "SeriesNumber")]
    pub series_number: Option<String>,
    #[sqlx(rename = "SeriesNumberFloat")]
    pub series_number_float: Option<f64>,
    #[sqlx(rename = "SeriesID")]
    pub series_id: Option<String>,
}

pub async fn written_columns(catalog: &Catalog, content_id: &str) -> WrittenColumns {
    sqlx::query_as(
        "SELECT Description, Series, SeriesNumber, SeriesNumberFloat, SeriesID FROM content WHERE ContentID = ?",
    )
    .bind(content_id)
    .fetch_one(catalog.pool())
    .await
    .unwrap()
}

pub async fn series_id(catalog: &Catalog, content_id: &str) -> Option<String> {
    written_columns(catalog, content_id).await.series_id
}

pub async fn file_size(catalog: &Catalog, content_id: &str) -> i64 {
    sqlx::query_scalar("SELECT ___FileSize FROM content WHERE ContentID = ?")
        .bind(content_id)
        .fetch_one(catalog.pool())
        .await
        .unwrap()
}

/// Whether a table or trigger exists.
pub async fn schema_object_exists(catalog: &Catalog, name: &str) -> bool {
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM sqlite_master WHERE name = ?")
        .bind(name)
        .fetch_one(catalog.pool())
        .await
        .unwrap();
    count > 0
}
