//! Writing metadata into the live catalog.
//!
//! Nickel owns the database and may insert rows at any moment while it
//! imports new books. Books already in the catalog are updated directly.
//! Books that aren't there yet are handled by the session's [`Strategy`].

mod script;
mod trigger;

pub use self::script::{DeferredScript, SCRIPT_FILE, literal, replay};
pub use self::trigger::{STAGING_TABLE, STAGING_TRIGGER};

use derive_more::Display;
use exn::ResultExt;
use nickelsync_content::ContentId;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::Catalog;
use crate::error::{ErrorKind, Result};
use crate::models::MetadataUpdate;
use crate::repo::Repository;
use crate::series::SeriesIdMap;

/// How to deliver updates for books Nickel hasn't imported yet.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum Strategy {
    /// Stage them in a table applied by an insert trigger.
    #[display("trigger")]
    Trigger,
    /// Write them to a script replayed by a later session.
    #[default]
    #[display("deferred")]
    Deferred,
}

impl Strategy {
    pub fn from_trigger_option(add_metadata_by_trigger: bool) -> Self {
        match add_metadata_by_trigger {
            true => Self::Trigger,
            false => Self::Deferred,
        }
    }
}

/// Outcome of one [`NickelWriter::apply`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Updated in place.
    pub updated: Vec<ContentId>,
    /// Parked in the staging table.
    pub staged: Vec<ContentId>,
    /// Written to the deferred script.
    pub deferred: Vec<ContentId>,
    /// Rows whose series grouping key was corrected.
    pub series_fixed: u64,
}

impl ApplyReport {
    /// Some updates only take effect once Nickel has imported the books, so
    /// another session is needed to confirm them.
    pub fn rerun_required(&self) -> bool {
        !self.staged.is_empty() || !self.deferred.is_empty()
    }
}

/// Applies a session's metadata updates to the catalog.
#[derive(Debug)]
pub struct NickelWriter {
    pool: SqlitePool,
    strategy: Strategy,
    script_path: PathBuf,
    script: DeferredScript,
}

impl NickelWriter {
    /// `root` is the onboard root; the deferred script always lives there,
    /// whichever volume the books are on.
    pub fn new(catalog: &Catalog, strategy: Strategy, root: impl AsRef<Path>) -> Self {
        Self {
            pool: catalog.pool().clone(),
            strategy,
            script_path: root.as_ref().join(SCRIPT_FILE),
            script: DeferredScript::new(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Set the catalog up for the strategy: install the staging table and
    /// trigger, or remove them if a previous session left them behind.
    #[instrument(skip(self), fields(strategy = %self.strategy))]
    pub async fn prepare(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        match self.strategy {
            Strategy::Trigger => trigger::install(&mut conn).await,
            Strategy::Deferred => trigger::remove(&mut conn).await,
        }
    }

    /// Write every update, and fix up series grouping keys, in a single
    /// transaction. On error nothing is written.
    ///
    /// `in_catalog` is the set of books Nickel had imported when the session
    /// opened.
    #[instrument(skip_all, fields(strategy = %self.strategy, updates = updates.len()))]
    pub async fn apply(
        &mut self,
        updates: &[MetadataUpdate],
        in_catalog: &BTreeSet<ContentId>,
        series_ids: &SeriesIdMap,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        let mut script = self.script.clone();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for update in updates {
            let resolved = update.resolve(series_ids);
            if in_catalog.contains(&update.content_id) {
                sqlx::query(include_str!("../../queries/update_metadata.sql"))
                    .bind(resolved.description.as_deref())
                    .bind(resolved.series.as_deref())
                    .bind(resolved.series_number.as_deref())
                    .bind(resolved.series_number_float)
                    .bind(resolved.series_id.as_deref())
                    .bind(resolved.content_id.as_str())
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                report.updated.push(resolved.content_id);
                continue;
            }
            match self.strategy {
                Strategy::Trigger => {
                    trigger::stage(&mut tx, &resolved).await?;
                    report.staged.push(resolved.content_id);
                },
                Strategy::Deferred => {
                    script.push_update(&resolved);
                    report.deferred.push(resolved.content_id);
                },
            }
        }
        report.series_fixed = series_ids.propagate(&mut tx).await?;

        // The script goes first: if the commit then fails, replaying it
        // later is harmless.
        script.persist(&self.script_path).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        self.script = script;

        tracing::info!(
            updated = report.updated.len(),
            staged = report.staged.len(),
            deferred = report.deferred.len(),
            series_fixed = report.series_fixed,
            "applied metadata updates"
        );
        Ok(report)
    }

    /// Make Nickel's idea of a book's size match the file that was actually
    /// written.
    ///
    /// Books not imported yet are only corrected with the deferred strategy;
    /// the statement goes out with the next [`apply`](Self::apply).
    /// Returns `true` if a correction was written or queued.
    #[instrument(skip(self, in_catalog), fields(%content_id))]
    pub async fn fix_file_size(&mut self, content_id: &ContentId, size: u64, in_catalog: bool) -> Result<bool> {
        if !in_catalog {
            return Ok(match self.strategy {
                Strategy::Deferred => {
                    self.script.push_file_size(content_id, size);
                    true
                },
                Strategy::Trigger => false,
            });
        }
        let repo = Repository::new(self.pool.clone());
        match repo.file_size(content_id).await? {
            Some(recorded) if recorded != size => {
                tracing::debug!(recorded, size, "correcting file size");
                repo.set_file_size(content_id, size).await
            },
            _ => Ok(false),
        }
    }

    /// Statements waiting for the next [`apply`](Self::apply) or already
    /// written to the script this session.
    pub fn deferred(&self) -> &DeferredScript {
        &self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, TestBook, WrittenColumns};

    const IN_DB: &str = "file:///mnt/onboard/Known.epub";
    const NEW: &str = "file:///mnt/onboard/New.epub";

    async fn catalog() -> Catalog {
        let catalog = Catalog::connect_in_memory().await.unwrap();
        fixtures::seed(&catalog).await;
        fixtures::insert(&catalog, &TestBook::sideloaded("Known.epub")).await;
        catalog
    }

    fn updates() -> Vec<MetadataUpdate> {
        vec![
            MetadataUpdate::new(
                ContentId::new(IN_DB),
                Some("Known description".to_string()),
                Some("Saga".to_string()),
                Some(1.0),
            ),
            MetadataUpdate::new(ContentId::new(NEW), Some("New description".to_string()), Some("Saga".to_string()), Some(2.0)),
        ]
    }

    fn snapshot() -> BTreeSet<ContentId> {
        BTreeSet::from([ContentId::new(IN_DB)])
    }

    fn series_ids() -> SeriesIdMap {
        SeriesIdMap::from_pairs([("Saga".to_string(), "saga-key".to_string())])
    }

    #[test]
    fn strategy_from_option() {
        assert_eq!(Strategy::from_trigger_option(true), Strategy::Trigger);
        assert_eq!(Strategy::from_trigger_option(false), Strategy::Deferred);
    }

    #[tokio::test]
    async fn trigger_applies_staged_fields_on_insert() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Trigger, root.path());
        writer.prepare().await.unwrap();
        assert!(fixtures::schema_object_exists(&catalog, STAGING_TABLE).await);
        assert!(fixtures::schema_object_exists(&catalog, STAGING_TRIGGER).await);

        let report = writer.apply(&updates(), &snapshot(), &series_ids()).await.unwrap();
        assert_eq!(report.updated, vec![ContentId::new(IN_DB)]);
        assert_eq!(report.staged, vec![ContentId::new(NEW)]);
        assert!(report.rerun_required());
        assert!(!writer.script_path().exists());
        assert_eq!(fixtures::written_columns(&catalog, IN_DB).await.series_id.as_deref(), Some("saga-key"));

        // Nickel imports the new book.
        fixtures::insert(&catalog, &TestBook::sideloaded("New.epub")).await;
        assert_eq!(
            fixtures::written_columns(&catalog, NEW).await,
            WrittenColumns {
                description: Some("New description".to_string()),
                series: Some("Saga".to_string()),
                series_number: Some("2".to_string()),
                series_number_float: Some(2.0),
                series_id: Some("saga-key".to_string()),
            }
        );
        let staged: i64 = sqlx::query_scalar("SELECT count(*) FROM _nickelsync_meta")
            .fetch_one(catalog.pool())
            .await
            .unwrap();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn trigger_ignores_store_books() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Trigger, root.path());
        writer.prepare().await.unwrap();
        let update = MetadataUpdate::new(ContentId::new("store-1"), None, Some("Saga".to_string()), None);
        writer.apply(&[update], &snapshot(), &SeriesIdMap::default()).await.unwrap();

        fixtures::insert(&catalog, &TestBook::store("store-1")).await;
        assert_eq!(fixtures::written_columns(&catalog, "store-1").await.series, None);
    }

    #[tokio::test]
    async fn deferred_writes_script_instead_of_updating() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Deferred, root.path());
        writer.prepare().await.unwrap();
        assert!(!fixtures::schema_object_exists(&catalog, STAGING_TABLE).await);

        let report = writer.apply(&updates(), &snapshot(), &series_ids()).await.unwrap();
        assert_eq!(report.updated, vec![ContentId::new(IN_DB)]);
        assert_eq!(report.deferred, vec![ContentId::new(NEW)]);
        assert!(report.rerun_required());

        let script = std::fs::read_to_string(writer.script_path()).unwrap();
        let statements: Vec<_> = script.lines().filter(|l| l.starts_with("UPDATE")).collect();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].ends_with(&format!("WHERE ContentID='{NEW}';")));
        assert!(statements[0].contains("SeriesID='saga-key'"));
        assert!(script.starts_with("BEGIN;\n") && script.ends_with("COMMIT;"));

        // The row doesn't exist, so there was nothing to update directly; once
        // it does the script fills it in.
        fixtures::insert(&catalog, &TestBook::sideloaded("New.epub")).await;
        assert_eq!(fixtures::written_columns(&catalog, NEW).await.series, None);
        assert!(replay(&catalog, writer.script_path()).await.unwrap());
        assert_eq!(fixtures::written_columns(&catalog, NEW).await.series_id.as_deref(), Some("saga-key"));
    }

    #[tokio::test]
    async fn deferred_script_accumulates_over_session() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Deferred, root.path());
        let [_, new] = <[MetadataUpdate; 2]>::try_from(updates()).unwrap();
        writer.apply(&[new], &snapshot(), &series_ids()).await.unwrap();
        let other = MetadataUpdate::new(ContentId::new("file:///mnt/onboard/Other.epub"), None, None, None);
        writer.apply(&[other], &snapshot(), &series_ids()).await.unwrap();

        let script = std::fs::read_to_string(writer.script_path()).unwrap();
        assert_eq!(script.lines().filter(|l| l.starts_with("UPDATE")).count(), 2);
        assert_eq!(writer.deferred().len(), 2);
    }

    #[tokio::test]
    async fn nothing_pending_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Deferred, root.path());
        let report = writer.apply(&updates()[..1], &snapshot(), &series_ids()).await.unwrap();
        assert!(!report.rerun_required());
        assert!(!writer.script_path().exists());
    }

    #[tokio::test]
    async fn failure_rolls_back_everything() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Trigger, root.path());
        // No staging table, so staging the new book fails after the known
        // book was already updated in the same transaction.
        let err = writer.apply(&updates(), &snapshot(), &series_ids()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Database));
        assert_eq!(fixtures::written_columns(&catalog, IN_DB).await.description, None);
    }

    #[tokio::test]
    async fn corrects_file_size() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog().await;
        let mut writer = NickelWriter::new(&catalog, Strategy::Deferred, root.path());

        assert!(writer.fix_file_size(&ContentId::new(IN_DB), 9999, true).await.unwrap());
        assert_eq!(fixtures::file_size(&catalog, IN_DB).await, 9999);
        assert!(!writer.fix_file_size(&ContentId::new(IN_DB), 9999, true).await.unwrap());

        assert!(writer.fix_file_size(&ContentId::new(NEW), 10, false).await.unwrap());
        assert_eq!(writer.deferred().len(), 1);
        writer.apply(&[], &snapshot(), &series_ids()).await.unwrap();
        let script = std::fs::read_to_string(writer.script_path()).unwrap();
        assert!(script.contains(&format!("SET ___FileSize=10 WHERE ContentID='{NEW}'")));

        let mut writer = NickelWriter::new(&catalog, Strategy::Trigger, root.path());
        assert!(!writer.fix_file_size(&ContentId::new(NEW), 10, false).await.unwrap());
    }
}
