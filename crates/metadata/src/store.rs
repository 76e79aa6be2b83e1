use exn::ResultExt;
use nickelsync_catalog::{CatalogBook, Repository};
use nickelsync_content::{ContentId, sanitize_lpath, to_content_id, to_filesystem_path, to_lpath};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::instrument;

use crate::epub::{EPUB_MIME_TYPES, EpubMetadata};
use crate::error::{ErrorKind, Result};
use crate::files::{DirtySet, METADATA_FILE};
use crate::json;
use crate::record::{BookRecord, format_timestamp};

/// The session's working set of books on the active volume, keyed by
/// content ID.
///
/// Built once per session by [`reconcile`](Self::reconcile), then mutated as
/// Calibre sends and deletes books. [`persist`](Self::persist) writes the
/// whole map back to `metadata.calibre`.
#[derive(Debug)]
pub struct MetadataStore {
    book_root: PathBuf,
    prefix: String,
    records: BTreeMap<ContentId, BookRecord>,
    in_catalog: BTreeSet<ContentId>,
}

impl MetadataStore {
    /// Merge the metadata cache with the books Nickel has imported.
    ///
    /// - books in both keep their cached record, with Nickel's file size,
    /// - books only in the catalog get a record built from the catalog row,
    ///   with any gaps filled from the EPUB itself,
    /// - books only in the cache are dropped, unless they are still `pending`
    ///   and their file is on the volume: Nickel just hasn't imported them.
    ///
    /// The result is written straight back to the cache.
    #[instrument(skip(repo, book_root, pending), fields(root = %book_root.as_ref().display()))]
    pub async fn reconcile(
        repo: &Repository,
        book_root: impl AsRef<Path>,
        prefix: &str,
        pending: &DirtySet,
    ) -> Result<Self> {
        let book_root = book_root.as_ref().to_path_buf();
        let cache_path = book_root.join(METADATA_FILE);
        let cached: Vec<BookRecord> = json::read(&cache_path).await?.unwrap_or_default();
        let cached_count = cached.len();
        let mut cached: BTreeMap<ContentId, BookRecord> = cached
            .into_iter()
            .map(|record| (to_content_id(&sanitize_lpath(&record.lpath), prefix), record))
            .collect();

        let books = repo.books(prefix).await.or_raise(|| ErrorKind::Catalog)?;
        let mut store = Self { book_root, prefix: prefix.to_string(), records: BTreeMap::new(), in_catalog: BTreeSet::new() };
        let mut synthesized = 0;
        for book in books {
            let content_id = book.content_id.clone();
            let record = match cached.remove(&content_id) {
                Some(record) => BookRecord { size: book.size, ..record },
                None => match store.synthesize(book).await {
                    Some(record) => {
                        synthesized += 1;
                        record
                    },
                    None => continue,
                },
            };
            store.records.insert(content_id, record);
        }
        store.in_catalog = store.records.keys().cloned().collect();

        let mut awaiting_import = 0;
        let mut dropped = 0;
        for (content_id, record) in cached {
            let on_volume = match store.filesystem_path(&content_id) {
                Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
                Err(_) => false,
            };
            if on_volume && pending.contains(&content_id) {
                tracing::debug!(%content_id, "keeping book Nickel hasn't imported yet");
                store.records.insert(content_id, record);
                awaiting_import += 1;
            } else {
                tracing::debug!(%content_id, "dropped from cache");
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::info!(count = dropped, "dropping cached books that are no longer on the device");
        }
        tracing::info!(
            books = store.records.len(),
            cached = cached_count,
            synthesized,
            awaiting_import,
            "reconciled metadata"
        );

        store.persist().await?;
        Ok(store)
    }

    /// Build a record for a book Nickel knows about but the cache doesn't.
    async fn synthesize(&self, book: CatalogBook) -> Option<BookRecord> {
        let content_id = book.content_id;
        let lpath = match to_lpath(&content_id, &self.prefix) {
            Ok(lpath) => lpath,
            Err(err) => {
                tracing::warn!(%content_id, "skipping book outside the volume: {err:?}");
                return None;
            },
        };
        tracing::debug!(%content_id, "book not in cache");
        let mut record = BookRecord {
            title: book.title.unwrap_or_default(),
            authors: book.authors,
            comments: book.description,
            publisher: book.publisher,
            series: book.series,
            series_index: book.series_index,
            size: book.size,
            ..BookRecord::new(lpath)
        };

        let Ok(path) = to_filesystem_path(&self.book_root, &content_id, &self.prefix) else {
            return Some(record);
        };
        if book.mime_type.as_deref().is_some_and(|mime| EPUB_MIME_TYPES.contains(&mime)) {
            let epub_path = path.clone();
            match tokio::task::spawn_blocking(move || EpubMetadata::read(&epub_path)).await {
                Ok(Ok(metadata)) => metadata.fill(&mut record),
                Ok(Err(err)) => tracing::warn!(%content_id, "could not read EPUB metadata: {err:?}"),
                Err(err) => tracing::error!(%content_id, "EPUB metadata task failed: {err}"),
            }
        }
        if let Ok(modified) = tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            record.last_modified = format_timestamp(OffsetDateTime::from(modified));
        }
        Some(record)
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Root of the volume the books are on.
    pub fn book_root(&self) -> &Path {
        &self.book_root
    }

    /// Content ID prefix of the active volume.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Content ID for a Calibre lpath on the active volume.
    pub fn content_id(&self, lpath: &str) -> ContentId {
        to_content_id(&sanitize_lpath(lpath), &self.prefix)
    }

    /// Where a book lives on disk.
    pub fn filesystem_path(&self, content_id: &ContentId) -> Result<PathBuf> {
        to_filesystem_path(&self.book_root, content_id, &self.prefix)
            .or_raise(|| ErrorKind::InvalidLpath(content_id.to_string()))
    }

    pub fn get(&self, content_id: &ContentId) -> Option<&BookRecord> {
        self.records.get(content_id)
    }

    pub fn get_by_lpath(&self, lpath: &str) -> Option<&BookRecord> {
        self.get(&self.content_id(lpath))
    }

    /// Every record, in content ID order.
    pub fn records(&self) -> impl Iterator<Item = (&ContentId, &BookRecord)> {
        self.records.iter()
    }

    /// Whether Nickel had imported the book when the session opened. Books
    /// kept while awaiting import are in the store but not here.
    pub fn is_in_catalog(&self, content_id: &ContentId) -> bool {
        self.in_catalog.contains(content_id)
    }

    /// The books Nickel had imported when the session opened.
    pub fn in_catalog(&self) -> &BTreeSet<ContentId> {
        &self.in_catalog
    }

    // =========================================================================
    // Mutate
    // =========================================================================

    /// Add or replace a record, keyed by its lpath. Returns its content ID.
    pub fn insert(&mut self, record: BookRecord) -> ContentId {
        let content_id = self.content_id(&record.lpath);
        self.records.insert(content_id.clone(), record);
        content_id
    }

    pub fn remove(&mut self, content_id: &ContentId) -> Option<BookRecord> {
        self.records.remove(content_id)
    }

    /// Rewrite `metadata.calibre` from the current map.
    #[instrument(skip(self), fields(books = self.records.len()))]
    pub async fn persist(&self) -> Result<()> {
        let records: Vec<&BookRecord> = self.records.values().collect();
        json::write(&self.book_root.join(METADATA_FILE), &records).await
    }
}
