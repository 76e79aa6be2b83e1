use exn::ResultExt;
use nickelsync_catalog::writer::{self, SCRIPT_FILE};
use nickelsync_catalog::{ApplyReport, Catalog, MetadataUpdate, NickelWriter, Repository, SeriesIdMap, Strategy};
use nickelsync_config::Config;
use nickelsync_content::{ContentId, Volume, sanitize_lpath};
use nickelsync_cover::{CoverPipeline, CoverRenderer};
use nickelsync_device::{Device, VersionInfo};
use nickelsync_metadata::{BookRecord, DirtySet, DriveInfo, MetadataStore};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::File;
use tracing::instrument;

use crate::client::{BookListing, ClientOptions, Passwords};
use crate::error::{ErrorKind, Result};
use crate::outcome::{Outcome, SessionEnd, Summary};

/// A book file opened for Calibre to write into.
#[derive(Debug)]
pub struct SavedBook {
    pub file: File,
    pub content_id: ContentId,
    /// The lpath the book was actually stored under, when it differs from
    /// the one Calibre sent.
    pub new_lpath: Option<String>,
}

/// One sync session: everything between Calibre connecting and Nickel being
/// told to re-read its library.
///
/// Calls are expected one at a time, in the order the protocol makes them.
/// The only background work is cover generation, joined by
/// [`finish`](Self::finish).
pub struct Session {
    config: Config,
    device: Device,
    volume: Volume,
    catalog: Catalog,
    writer: NickelWriter,
    series_ids: SeriesIdMap,
    store: MetadataStore,
    dirty: DirtySet,
    drive_info: DriveInfo,
    covers: CoverPipeline,
    passwords: Passwords,
}

impl Session {
    /// Identify the device, open the catalog and reconcile Calibre's cache
    /// against it.
    ///
    /// `root` is the onboard mount point, where the catalog and nickelsync's
    /// own files live. Books go to `sd_root` instead when it's given and the
    /// config prefers the SD card.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>, sd_root: Option<&Path>, config: Config) -> Result<Self> {
        let root = root.as_ref();
        let version = VersionInfo::read(root).await.or_raise(|| ErrorKind::Device)?;
        let volume = Volume::select(config.prefer_sd_card, sd_root.is_some());
        let book_root = match (volume, sd_root) {
            (Volume::Sd, Some(sd_root)) => sd_root.to_path_buf(),
            _ => root.to_path_buf(),
        };
        tracing::info!(
            device = version.device.model(),
            firmware = %version.firmware,
            volume = volume.location_code(),
            "opening session"
        );

        let catalog = Catalog::open(root).await.or_raise(|| ErrorKind::Catalog)?;
        // A failed replay leaves the script for the next session.
        if let Err(err) = writer::replay(&catalog, &root.join(SCRIPT_FILE)).await {
            tracing::warn!("could not replay deferred updates: {err:?}");
        }
        let strategy = Strategy::from_trigger_option(config.add_metadata_by_trigger);
        let writer = NickelWriter::new(&catalog, strategy, root);
        writer.prepare().await.or_raise(|| ErrorKind::Catalog)?;

        let repo = Repository::from(&catalog);
        let dirty = DirtySet::load(root).await.or_raise(|| ErrorKind::Metadata)?;
        let store = MetadataStore::reconcile(&repo, &book_root, volume.prefix(), &dirty)
            .await
            .or_raise(|| ErrorKind::Metadata)?;
        let series_ids = repo.series_ids().await.or_raise(|| ErrorKind::Catalog)?;
        let drive_info = DriveInfo::load_or_new(&book_root, volume.location_code(), &version.device.display_name())
            .await
            .or_raise(|| ErrorKind::Metadata)?;
        let renderer = CoverRenderer::new(version.device, book_root.join(volume.image_dir()), config.cover_options());

        let mut session = Self {
            passwords: Passwords::new(config.password_list.clone()),
            config,
            device: version.device,
            volume,
            catalog,
            writer,
            series_ids,
            store,
            dirty,
            drive_info,
            covers: CoverPipeline::new(renderer),
        };
        // Series keys only; pending updates wait for the final flush.
        let report = session
            .writer
            .apply(&[], session.store.in_catalog(), &session.series_ids)
            .await
            .or_raise(|| ErrorKind::Flush)?;
        tracing::debug!(series_fixed = report.series_fixed, strategy = %strategy, "session ready");
        Ok(session)
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Root of the volume books are stored on.
    pub fn book_root(&self) -> &Path {
        self.store.book_root()
    }

    /// Bytes available for new books on the active volume.
    pub fn free_space(&self) -> Result<u64> {
        let book_root = self.store.book_root();
        fs4::available_space(book_root).or_raise(|| ErrorKind::Io(book_root.to_path_buf()))
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Books whose metadata hasn't reached the catalog yet.
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            extensions: ClientOptions::extensions(self.config.prefer_kepub),
            device_model: self.device.display_name(),
            cover_size: self.config.cover_options().level.thumbnail_size(self.device),
        }
    }

    /// Every book on the active volume. Books without a known modification
    /// time are reported as modified now.
    pub fn book_list(&self) -> Vec<BookListing> {
        let now = OffsetDateTime::now_utc();
        self.store
            .records()
            .map(|(_, record)| BookListing {
                uuid: record.uuid.clone(),
                lpath: record.lpath.clone(),
                last_modified: record.last_modified().unwrap_or(now),
                extension: record.extension().to_string(),
            })
            .collect()
    }

    /// Records for the given lpaths, or for every book when none are given.
    pub fn metadata_list(&self, lpaths: &[String]) -> Vec<BookRecord> {
        if lpaths.is_empty() {
            return self.store.records().map(|(_, record)| record.clone()).collect();
        }
        lpaths
            .iter()
            .filter_map(|lpath| {
                let record = self.store.get_by_lpath(lpath);
                if record.is_none() {
                    tracing::debug!(%lpath, "metadata requested for unknown book");
                }
                record.cloned()
            })
            .collect()
    }

    pub fn device_info(&self) -> &DriveInfo {
        &self.drive_info
    }

    pub async fn set_device_info(&mut self, info: DriveInfo) -> Result<()> {
        info.save(self.store.book_root()).await.or_raise(|| ErrorKind::Metadata)?;
        self.drive_info = info;
        Ok(())
    }

    /// The next password to offer Calibre, until the list runs out.
    pub fn next_password(&mut self) -> Option<&str> {
        self.passwords.next_password()
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Replace the records Calibre sent. Their metadata is written to the
    /// catalog when the session finishes.
    #[instrument(skip_all, fields(count = records.len()))]
    pub async fn update_metadata(&mut self, records: Vec<BookRecord>) -> Result<()> {
        for mut record in records {
            record.thumbnail = None;
            let sanitized = match sanitize_lpath(&record.lpath) {
                Cow::Owned(lpath) => Some(lpath),
                Cow::Borrowed(_) => None,
            };
            if let Some(lpath) = sanitized {
                tracing::debug!(from = %record.lpath, to = %lpath, "normalised lpath");
                record.lpath = lpath;
            }
            let content_id = self.store.insert(record);
            tracing::debug!(%content_id, "metadata updated");
            self.dirty.insert(content_id);
        }
        self.persist().await
    }

    /// Open the destination of a book Calibre is about to send.
    ///
    /// The caller writes the `len` bytes of the book into the returned file.
    /// The cache is only written once `last_book` is set.
    #[instrument(skip(self, record), fields(lpath = %record.lpath))]
    pub async fn save_book(&mut self, mut record: BookRecord, len: u64, last_book: bool) -> Result<SavedBook> {
        let new_lpath = match sanitize_lpath(&record.lpath) {
            Cow::Owned(lpath) => Some(lpath),
            Cow::Borrowed(_) => None,
        };
        if let Some(lpath) = &new_lpath {
            tracing::info!(from = %record.lpath, to = %lpath, "renamed book");
            record.lpath = lpath.clone();
        }
        let content_id = self.store.content_id(&record.lpath);
        let path = self
            .store
            .filesystem_path(&content_id)
            .or_raise(|| ErrorKind::InvalidLpath(record.lpath.clone()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
        }
        let file = File::create(&path).await.or_raise(|| ErrorKind::Io(path.clone()))?;

        self.dirty.insert(content_id.clone());
        if let Some(thumbnail) = record.thumbnail.take() {
            self.covers.spawn(&content_id, thumbnail.into_data());
        }
        let in_catalog = self.store.is_in_catalog(&content_id);
        if let Err(err) = self.writer.fix_file_size(&content_id, len, in_catalog).await {
            tracing::warn!(%content_id, "could not correct file size: {err:?}");
        }
        record.size = len;
        self.store.insert(record);
        if last_book {
            self.persist().await?;
        }
        Ok(SavedBook { file, content_id, new_lpath })
    }

    /// Open a book for Calibre to read. Returns the file and its length.
    #[instrument(skip(self))]
    pub async fn get_book(&self, lpath: &str) -> Result<(File, u64)> {
        let content_id = self.store.content_id(lpath);
        if self.store.get(&content_id).is_none() {
            exn::bail!(ErrorKind::UnknownBook(lpath.to_string()));
        }
        let path = self.store.filesystem_path(&content_id).or_raise(|| ErrorKind::InvalidLpath(lpath.to_string()))?;
        let file = File::open(&path).await.or_raise(|| ErrorKind::Io(path.clone()))?;
        let len = file.metadata().await.or_raise(|| ErrorKind::Io(path.clone()))?.len();
        Ok((file, len))
    }

    /// Remove a book, and any directories it leaves empty.
    #[instrument(skip(self))]
    pub async fn delete_book(&mut self, lpath: &str) -> Result<()> {
        let content_id = self.store.content_id(lpath);
        let path = self.store.filesystem_path(&content_id).or_raise(|| ErrorKind::InvalidLpath(lpath.to_string()))?;
        match tokio::fs::remove_file(&path).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "book file already gone");
            },
            result => result.or_raise(|| ErrorKind::Io(path.clone()))?,
        }
        self.remove_empty_parents(&path).await;
        self.store.remove(&content_id);
        self.dirty.remove(&content_id);
        tracing::info!(%content_id, "deleted book");
        self.persist().await
    }

    async fn remove_empty_parents(&self, path: &Path) {
        let root = self.store.book_root();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == root || !current.starts_with(root) {
                break;
            }
            // Fails on anything that still has entries.
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            tracing::debug!(dir = %current.display(), "removed empty directory");
            dir = current.parent();
        }
    }

    // =========================================================================
    // Flush
    // =========================================================================

    async fn persist(&self) -> Result<()> {
        self.store.persist().await.or_raise(|| ErrorKind::Metadata)?;
        self.dirty.save().await.or_raise(|| ErrorKind::Metadata)
    }

    /// Write every dirty book's metadata to the catalog.
    ///
    /// Only books updated in place leave the dirty set. Staged and deferred
    /// books stay until a later session finds them imported, so their
    /// records survive a sync that runs before Nickel gets to them.
    async fn flush(&mut self) -> Result<ApplyReport> {
        let mut updates = Vec::with_capacity(self.dirty.len());
        let mut gone = Vec::new();
        for content_id in self.dirty.iter() {
            match self.store.get(content_id) {
                Some(record) => updates.push(MetadataUpdate::new(
                    content_id.clone(),
                    record.comments.clone(),
                    record.series.clone(),
                    record.series_index,
                )),
                None => gone.push(content_id.clone()),
            }
        }
        for content_id in &gone {
            tracing::debug!(%content_id, "dropping update for a book no longer on the device");
            self.dirty.remove(content_id);
        }

        let report = self
            .writer
            .apply(&updates, self.store.in_catalog(), &self.series_ids)
            .await
            .or_raise(|| ErrorKind::Flush);
        if let Ok(report) = &report {
            for content_id in &report.updated {
                self.dirty.remove(content_id);
            }
        }
        self.dirty.save().await.or_raise(|| ErrorKind::Metadata)?;
        report
    }

    /// End the session: wait for covers, write the cache and flush pending
    /// metadata to the catalog.
    ///
    /// Runs whether or not the Calibre connection ended cleanly; `end` only
    /// shapes the summary.
    #[instrument(skip_all, fields(end = ?end))]
    pub async fn finish(mut self, end: SessionEnd) -> Result<Summary> {
        let covers = self.covers.join().await;
        self.store.persist().await.or_raise(|| ErrorKind::Metadata)?;
        let flushed = self.flush().await;
        self.catalog.close().await;
        let report = flushed?;

        let outcome = match report.rerun_required() {
            true => Outcome::RerunRequired,
            false => Outcome::NoAction,
        };
        let summary = Summary { outcome, end };
        tracing::info!(%outcome, covers, code = summary.return_code().code(), "session finished");
        Ok(summary)
    }
}

/// Replay the deferred update script below the onboard root, if there is one.
///
/// Returns `false` when there was nothing to replay.
#[instrument(skip_all, fields(root = %root.as_ref().display()))]
pub async fn apply_deferred(root: impl AsRef<Path>) -> Result<bool> {
    let root = root.as_ref();
    let catalog = Catalog::open(root).await.or_raise(|| ErrorKind::Catalog)?;
    let replayed = writer::replay(&catalog, &root.join(SCRIPT_FILE)).await.or_raise(|| ErrorKind::Flush);
    catalog.close().await;
    replayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ReturnCode;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use nickelsync_catalog::fixtures::{self, TestBook};
    use nickelsync_content::image_id;
    use nickelsync_cover::{CoverClass, GenerateLevel};
    use nickelsync_device::VERSION_FILE;
    use nickelsync_metadata::{DIRTY_FILE, METADATA_FILE, Thumbnail};
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    const CLARA: &str = "N249220001234,4.1.15,4.20.14622,4.1.15,4.1.15,00000000-0000-0000-0000-000000000376\n";
    const NEW_ID: &str = "file:///mnt/onboard/New/Book.kepub.epub";

    /// A device root with a version file and an empty catalog.
    async fn device() -> (TempDir, Catalog) {
        let root = tempfile::tempdir().unwrap();
        let catalog = fixtures::create(root.path()).await;
        std::fs::write(root.path().join(VERSION_FILE), CLARA).unwrap();
        (root, catalog)
    }

    /// Put a sideloaded book on disk and in the catalog.
    async fn sideload(root: &Path, catalog: &Catalog, lpath: &str, contents: &[u8]) {
        let path = root.join(lpath);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        fixtures::insert(catalog, &TestBook::sideloaded(lpath).size(contents.len() as i64)).await;
    }

    fn new_book() -> BookRecord {
        BookRecord {
            comments: Some("A new book".to_string()),
            series: Some("Saga".to_string()),
            series_index: Some(2.0),
            ..BookRecord::new("/New/Book.kepub.epub")
        }
    }

    fn thumbnail() -> Thumbnail {
        let image = image::RgbImage::from_pixel(60, 90, image::Rgb([200, 30, 30]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image).write_to(&mut bytes, image::ImageFormat::Jpeg).unwrap();
        Thumbnail(60, 90, BASE64_STANDARD.encode(bytes.into_inner()))
    }

    async fn save(session: &mut Session, record: BookRecord, contents: &[u8]) -> SavedBook {
        let mut saved = session.save_book(record, contents.len() as u64, true).await.unwrap();
        saved.file.write_all(contents).await.unwrap();
        saved.file.flush().await.unwrap();
        saved
    }

    #[tokio::test]
    async fn open_reconciles_and_lists_books() {
        let (root, catalog) = device().await;
        sideload(root.path(), &catalog, "Author/Known.epub", b"epub bytes").await;

        let session = Session::open(root.path(), None, Config::default()).await.unwrap();
        assert_eq!(session.device(), Device::ClaraHd);
        assert_eq!(session.volume(), Volume::Onboard);
        assert!(root.path().join(METADATA_FILE).is_file());

        let books = session.book_list();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].lpath, "Author/Known.epub");
        assert_eq!(books[0].extension, ".epub");
        assert_eq!(books[0].uuid.len(), 36);
        assert_eq!(session.metadata_list(&[]).len(), 1);
        assert_eq!(session.metadata_list(&["Author/Known.epub".to_string()])[0].size, 10);
        assert!(session.metadata_list(&["Nope.epub".to_string()]).is_empty());

        assert_eq!(session.device_info().location_code, "main");
        assert_eq!(session.device_info().device_name, "Kobo Clara HD");
        let options = session.client_options();
        assert_eq!(options.device_model, "Kobo Clara HD");
        assert_eq!(options.extensions[0], "epub");
        assert_eq!(options.cover_size, GenerateLevel::All.thumbnail_size(Device::ClaraHd));

        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::NoAction);
        assert_eq!(summary.return_code(), ReturnCode::Success);
    }

    #[tokio::test]
    async fn unidentified_device_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        fixtures::create(root.path()).await;
        let err = Session::open(root.path(), None, Config::default()).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Device));
    }

    #[tokio::test]
    async fn deferred_updates_reach_the_catalog_on_the_next_session() {
        let (root, catalog) = device().await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();
        let saved = save(&mut session, new_book(), b"kepub").await;
        assert_eq!(saved.new_lpath.as_deref(), Some("New/Book.kepub"));
        assert_eq!(saved.content_id.as_str(), NEW_ID);
        assert!(root.path().join("New/Book.kepub.epub").is_file());
        assert!(session.dirty().contains(&saved.content_id));
        assert!(root.path().join(DIRTY_FILE).is_file());

        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::RerunRequired);
        assert_eq!(summary.return_code(), ReturnCode::Rerun);
        let script = std::fs::read_to_string(root.path().join(SCRIPT_FILE)).unwrap();
        assert!(script.contains(NEW_ID));
        assert!(root.path().join(DIRTY_FILE).is_file());

        // Nickel imports the book before the next run.
        fixtures::insert(&catalog, &TestBook::sideloaded("New/Book.kepub")).await;
        let session = Session::open(root.path(), None, Config::default()).await.unwrap();
        assert!(!root.path().join(SCRIPT_FILE).exists());
        let written = fixtures::written_columns(&catalog, NEW_ID).await;
        assert_eq!(written.description.as_deref(), Some("A new book"));
        assert_eq!(written.series.as_deref(), Some("Saga"));
        assert_eq!(written.series_number_float, Some(2.0));
        assert_eq!(fixtures::file_size(&catalog, NEW_ID).await, 5);

        let record = session.store().get(&ContentId::new(NEW_ID)).unwrap();
        assert_eq!(record.lpath, "New/Book.kepub");
        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::NoAction);
        assert!(!root.path().join(DIRTY_FILE).exists());
    }

    #[tokio::test]
    async fn deferred_book_survives_a_sync_before_import() {
        let (root, catalog) = device().await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();
        save(&mut session, new_book(), b"kepub").await;
        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::RerunRequired);

        // Calibre connects again before Nickel has imported the book. The
        // replayed script matches nothing, so the update has to be queued again.
        let session = Session::open(root.path(), None, Config::default()).await.unwrap();
        let id = ContentId::new(NEW_ID);
        assert!(!root.path().join(SCRIPT_FILE).exists());
        assert!(session.dirty().contains(&id));
        assert!(!session.store().is_in_catalog(&id));
        assert_eq!(session.store().get(&id).unwrap().comments.as_deref(), Some("A new book"));
        assert_eq!(session.book_list().len(), 1);
        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::RerunRequired);
        let script = std::fs::read_to_string(root.path().join(SCRIPT_FILE)).unwrap();
        assert!(script.contains("A new book"));

        fixtures::insert(&catalog, &TestBook::sideloaded("New/Book.kepub")).await;
        let session = Session::open(root.path(), None, Config::default()).await.unwrap();
        let written = fixtures::written_columns(&catalog, NEW_ID).await;
        assert_eq!(written.description.as_deref(), Some("A new book"));
        assert_eq!(written.series.as_deref(), Some("Saga"));
        assert!(session.store().is_in_catalog(&id));
        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::NoAction);
        assert!(!root.path().join(DIRTY_FILE).exists());
    }

    #[tokio::test]
    async fn trigger_applies_updates_when_nickel_imports() {
        let (root, catalog) = device().await;
        let config = Config { add_metadata_by_trigger: true, ..Config::default() };
        let mut session = Session::open(root.path(), None, config).await.unwrap();
        save(&mut session, new_book(), b"kepub").await;
        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::RerunRequired);
        assert!(!root.path().join(SCRIPT_FILE).exists());

        fixtures::insert(&catalog, &TestBook::sideloaded("New/Book.kepub")).await;
        let written = fixtures::written_columns(&catalog, NEW_ID).await;
        assert_eq!(written.description.as_deref(), Some("A new book"));
        assert_eq!(written.series_number.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn updated_metadata_is_written_in_place() {
        let (root, catalog) = device().await;
        sideload(root.path(), &catalog, "Known.epub", b"epub").await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();

        let mut record = session.metadata_list(&[]).remove(0);
        record.comments = Some("Now with a description".to_string());
        record.thumbnail = Some(thumbnail());
        session.update_metadata(vec![record]).await.unwrap();
        assert!(root.path().join(DIRTY_FILE).is_file());
        let cached = std::fs::read_to_string(root.path().join(METADATA_FILE)).unwrap();
        assert!(cached.contains("Now with a description"));
        assert!(!cached.contains("thumbnail"));

        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::NoAction);
        assert!(!root.path().join(DIRTY_FILE).exists());
        let written = fixtures::written_columns(&catalog, "file:///mnt/onboard/Known.epub").await;
        assert_eq!(written.description.as_deref(), Some("Now with a description"));
    }

    #[tokio::test]
    async fn updated_lpaths_are_normalised() {
        let (root, catalog) = device().await;
        sideload(root.path(), &catalog, "Known.kepub.epub", b"kepub").await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();

        let record = BookRecord { comments: Some("Updated".to_string()), ..BookRecord::new("/Known.kepub.epub") };
        session.update_metadata(vec![record]).await.unwrap();
        let books = session.book_list();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].lpath, "Known.kepub");
        let cached: Vec<serde_json::Value> =
            serde_json::from_slice(&std::fs::read(root.path().join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0]["lpath"], "Known.kepub");

        session.finish(SessionEnd::Completed).await.unwrap();
        let written = fixtures::written_columns(&catalog, "file:///mnt/onboard/Known.kepub.epub").await;
        assert_eq!(written.description.as_deref(), Some("Updated"));
    }

    #[tokio::test]
    async fn reports_free_space_on_the_book_volume() {
        let (root, _catalog) = device().await;
        let session = Session::open(root.path(), None, Config::default()).await.unwrap();
        assert!(session.free_space().unwrap() > 0);
        session.finish(SessionEnd::Completed).await.unwrap();

        let sd = tempfile::tempdir().unwrap();
        let config = Config { prefer_sd_card: true, ..Config::default() };
        let session = Session::open(root.path(), Some(sd.path()), config).await.unwrap();
        assert_eq!(session.book_root(), sd.path());
        assert!(session.free_space().unwrap() > 0);
    }

    #[tokio::test]
    async fn abnormal_end_still_flushes() {
        let (root, catalog) = device().await;
        sideload(root.path(), &catalog, "Known.epub", b"epub").await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();
        let mut record = session.metadata_list(&[]).remove(0);
        record.series = Some("Saga".to_string());
        session.update_metadata(vec![record]).await.unwrap();

        let summary = session.finish(SessionEnd::PasswordRejected).await.unwrap();
        assert_eq!(summary.return_code(), ReturnCode::PasswordError);
        assert_eq!(summary.status(), "No valid password found!");
        let written = fixtures::written_columns(&catalog, "file:///mnt/onboard/Known.epub").await;
        assert_eq!(written.series.as_deref(), Some("Saga"));
    }

    #[tokio::test]
    async fn covers_are_generated_from_thumbnails() {
        let (root, _catalog) = device().await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();
        let record = BookRecord { thumbnail: Some(thumbnail()), ..new_book() };
        let saved = save(&mut session, record, b"kepub").await;
        session.finish(SessionEnd::Completed).await.unwrap();

        let image_id = image_id(&saved.content_id);
        for class in CoverClass::ALL {
            let path = root.path().join(".kobo-images").join(class.relative_path(&image_id));
            assert!(path.is_file(), "missing {}", path.display());
        }
        let cached = std::fs::read_to_string(root.path().join(METADATA_FILE)).unwrap();
        assert!(!cached.contains("thumbnail"));
    }

    #[tokio::test]
    async fn get_and_delete_books() {
        let (root, catalog) = device().await;
        sideload(root.path(), &catalog, "Author/Series/Book.epub", b"twelve bytes").await;
        sideload(root.path(), &catalog, "Other.epub", b"other").await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();

        let (_file, len) = session.get_book("Author/Series/Book.epub").await.unwrap();
        assert_eq!(len, 12);
        let err = session.get_book("Missing.epub").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownBook(_)));

        session.delete_book("Author/Series/Book.epub").await.unwrap();
        assert!(!root.path().join("Author").exists());
        assert!(root.path().join("Other.epub").is_file());
        assert_eq!(session.book_list().len(), 1);
        let cached: Vec<serde_json::Value> =
            serde_json::from_slice(&std::fs::read(root.path().join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(cached.len(), 1);
        session.finish(SessionEnd::Completed).await.unwrap();
    }

    #[tokio::test]
    async fn deleted_books_leave_the_dirty_set() {
        let (root, _catalog) = device().await;
        let mut session = Session::open(root.path(), None, Config::default()).await.unwrap();
        let saved = save(&mut session, new_book(), b"kepub").await;
        session.delete_book("New/Book.kepub").await.unwrap();
        assert!(!session.dirty().contains(&saved.content_id));
        assert!(!root.path().join("New").exists());

        let summary = session.finish(SessionEnd::Completed).await.unwrap();
        assert_eq!(summary.outcome, Outcome::NoAction);
    }

    #[tokio::test]
    async fn books_go_to_the_sd_card_when_preferred() {
        let (root, _catalog) = device().await;
        let sd = tempfile::tempdir().unwrap();
        let config = Config { prefer_sd_card: true, ..Config::default() };
        let mut session = Session::open(root.path(), Some(sd.path()), config).await.unwrap();
        assert_eq!(session.volume(), Volume::Sd);
        assert_eq!(session.book_root(), sd.path());
        assert_eq!(session.device_info().location_code, "A");

        let saved = save(&mut session, new_book(), b"kepub").await;
        assert_eq!(saved.content_id.as_str(), "file:///mnt/sd/New/Book.kepub.epub");
        assert!(sd.path().join("New/Book.kepub.epub").is_file());
        session.finish(SessionEnd::Completed).await.unwrap();
        assert!(sd.path().join(METADATA_FILE).is_file());
        assert!(root.path().join(SCRIPT_FILE).is_file());
    }

    #[tokio::test]
    async fn device_info_and_passwords() {
        let (root, _catalog) = device().await;
        let config = Config { password_list: vec!["hunter2".to_string()], ..Config::default() };
        let mut session = Session::open(root.path(), None, config).await.unwrap();
        assert_eq!(session.next_password(), Some("hunter2"));
        assert_eq!(session.next_password(), None);

        let mut info = session.device_info().clone();
        info.extra.insert("calibre_version".to_string(), "7.0".into());
        session.set_device_info(info.clone()).await.unwrap();
        let written: DriveInfo =
            serde_json::from_slice(&std::fs::read(root.path().join("driveinfo.calibre")).unwrap()).unwrap();
        assert_eq!(written, info);
    }

    #[tokio::test]
    async fn apply_deferred_replays_once() {
        let (root, catalog) = device().await;
        sideload(root.path(), &catalog, "Known.epub", b"epub").await;
        std::fs::create_dir_all(root.path().join(".adds/nickelsync")).unwrap();
        std::fs::write(
            root.path().join(SCRIPT_FILE),
            "BEGIN;\nUPDATE content SET Description='It''s here' WHERE ContentID='file:///mnt/onboard/Known.epub' AND ContentType=6;\nCOMMIT;\n",
        )
        .unwrap();

        assert!(apply_deferred(root.path()).await.unwrap());
        assert!(!apply_deferred(root.path()).await.unwrap());
        let written = fixtures::written_columns(&catalog, "file:///mnt/onboard/Known.epub").await;
        assert_eq!(written.description.as_deref(), Some("It's here"));
    }
}
