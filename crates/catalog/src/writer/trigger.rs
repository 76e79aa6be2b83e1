//! The staging table and its insert trigger.
//!
//! Updates for books Nickel hasn't imported yet are parked in a table. When
//! Nickel inserts the book's row, the trigger copies the staged columns onto
//! it and deletes the staged row.

use exn::ResultExt;
use sqlx::SqliteConnection;

use crate::error::{ErrorKind, Result};
use crate::models::ResolvedUpdate;

pub const STAGING_TABLE: &str = "_nickelsync_meta";
pub const STAGING_TRIGGER: &str = "_nickelsync_meta_content_insert";

/// Create the staging table and (re)create the trigger, clearing anything
/// left staged.
pub(crate) async fn install(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::raw_sql(include_str!("../../queries/staging_install.sql"))
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Drop the staging table and the trigger, if present.
pub(crate) async fn remove(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::raw_sql(include_str!("../../queries/staging_remove.sql"))
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

pub(crate) async fn stage(conn: &mut SqliteConnection, update: &ResolvedUpdate) -> Result<()> {
    sqlx::query(include_str!("../../queries/staging_upsert.sql"))
        .bind(update.content_id.as_str())
        .bind(update.description.as_deref())
        .bind(update.series.as_deref())
        .bind(update.series_number.as_deref())
        .bind(update.series_number_float)
        .bind(update.series_id.as_deref())
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}
