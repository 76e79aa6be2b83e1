//! The deferred update script.
//!
//! Updates for books Nickel hasn't imported yet can't be applied: there's no
//! row to update. They're written to a plain SQL script instead, and replayed
//! by a later session once Nickel has caught up.

use exn::ResultExt;
use nickelsync_content::ContentId;
use std::fmt::Write as _;
use std::path::Path;
use tracing::instrument;

use crate::Catalog;
use crate::error::{ErrorKind, Result};
use crate::models::ResolvedUpdate;

/// Location of the script, relative to the onboard root.
pub const SCRIPT_FILE: &str = ".adds/nickelsync/updated-md.sql";

const BEGIN: &str = "BEGIN;\n";
const COMMIT: &str = "COMMIT;";

/// Statements accumulated over a session, rendered as one transaction.
///
/// Every value is embedded as a literal, so everything goes through
/// [`literal`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeferredScript {
    statements: Vec<String>,
}

impl DeferredScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn push_update(&mut self, update: &ResolvedUpdate) {
        self.statements.push(format!(
            "UPDATE content SET Description={}, Series={}, SeriesNumber={}, SeriesNumberFloat={}, SeriesID={} WHERE ContentID={};",
            literal(update.description.as_deref()),
            literal(update.series.as_deref()),
            literal(update.series_number.as_deref()),
            update.series_number_float.map_or_else(|| "NULL".to_string(), |n| format!("{n:?}")),
            literal(update.series_id.as_deref()),
            literal(Some(update.content_id.as_str())),
        ));
    }

    pub fn push_file_size(&mut self, content_id: &ContentId, size: u64) {
        self.statements.push(format!(
            "UPDATE content SET ___FileSize={size} WHERE ContentID={} AND ContentType=6;",
            literal(Some(content_id.as_str())),
        ));
    }

    /// The complete script text.
    pub fn render(&self) -> String {
        let mut sql = String::from(BEGIN);
        for statement in &self.statements {
            // Writing to a String can't fail.
            let _ = writeln!(sql, "{statement}");
        }
        sql.push_str(COMMIT);
        sql
    }

    /// Write the script, replacing any previous one. Nothing is written when
    /// there are no statements.
    ///
    /// Returns `true` if a file was written.
    #[instrument(skip(self), fields(statements = self.len()))]
    pub async fn persist(&self, path: &Path) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Script(parent.to_path_buf()))?;
        }
        let part = path.with_extension("sql.part");
        tokio::fs::write(&part, self.render()).await.or_raise(|| ErrorKind::Script(part.clone()))?;
        tokio::fs::rename(&part, path).await.or_raise(|| ErrorKind::Script(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "wrote deferred updates");
        Ok(true)
    }
}

/// An SQL string literal, or `NULL`.
pub fn literal(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("'{}'", value.replace('\'', "''")),
        None => "NULL".to_string(),
    }
}

/// Run a script left by a previous session, then remove it.
///
/// The script runs inside a single transaction; if any statement fails,
/// nothing is applied and the file is left in place for the next attempt.
/// Returns `false` if there was no script.
#[instrument(skip(catalog), fields(path = %path.display()))]
pub async fn replay(catalog: &Catalog, path: &Path) -> Result<bool> {
    let sql = match tokio::fs::read_to_string(path).await {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        result => result.or_raise(|| ErrorKind::Script(path.to_path_buf()))?,
    };
    let body = sql.strip_prefix(BEGIN).unwrap_or(&sql);
    let body = body.trim_end();
    let body = body.strip_suffix(COMMIT).unwrap_or(body);

    let mut tx = catalog.pool().begin().await.or_raise(|| ErrorKind::Database)?;
    let result = sqlx::raw_sql(body).execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
    tx.commit().await.or_raise(|| ErrorKind::Database)?;
    tracing::info!(rows = result.rows_affected(), "replayed deferred updates");

    tokio::fs::remove_file(path).await.or_raise(|| ErrorKind::Script(path.to_path_buf()))?;
    Ok(true)
}
