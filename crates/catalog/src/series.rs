use exn::ResultExt;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;

use crate::error::{ErrorKind, Result};

/// Series name to the grouping key Nickel uses for it.
///
/// Books bought from the Kobo store carry an opaque `SeriesID`. A sideloaded
/// book in the same series only groups with them if it uses that same key
/// instead of its series name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeriesIdMap(BTreeMap<String, String>);

impl SeriesIdMap {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Gather the pairs from every store book that has both.
    pub(crate) async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let rows: Vec<(String, String)> = sqlx::query_as(include_str!("../queries/series_pairs.sql"))
            .fetch_all(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self::from_pairs(rows))
    }

    /// The grouping key for a series: the store's key when known, the name
    /// itself otherwise.
    pub fn resolve<'a>(&'a self, series: &'a str) -> &'a str {
        self.0.get(series).map(String::as_str).unwrap_or(series)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply the map to every sideloaded book in a known series, then give
    /// every book with a series but no grouping key its series name as key.
    ///
    /// Returns the number of rows changed.
    pub(crate) async fn propagate(&self, conn: &mut SqliteConnection) -> Result<u64> {
        let mut changed = 0;
        for (series, series_id) in &self.0 {
            changed += sqlx::query(include_str!("../queries/propagate_series_id.sql"))
                .bind(series_id)
                .bind(series)
                .bind(series_id)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?
                .rows_affected();
        }
        changed += sqlx::query(include_str!("../queries/fill_series_id.sql"))
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        Ok(changed)
    }
}
