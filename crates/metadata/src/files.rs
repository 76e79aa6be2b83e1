//! The small state files kept next to the books.

use nickelsync_content::ContentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::Result;
use crate::json;
use crate::record::new_uuid;

/// Calibre's metadata cache, relative to the book volume's root.
pub const METADATA_FILE: &str = "metadata.calibre";
/// Calibre's device info, relative to the book volume's root.
pub const DRIVEINFO_FILE: &str = "driveinfo.calibre";
/// IDs still waiting to be written to the catalog, relative to the onboard
/// root.
pub const DIRTY_FILE: &str = ".adds/nickelsync/dirty.json";

/// What Calibre knows about the device volume (`driveinfo.calibre`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveInfo {
    /// `main` for internal storage, `A` for the SD card.
    #[serde(default)]
    pub location_code: String,
    #[serde(default)]
    pub device_name: String,
    /// Random, created once per volume.
    #[serde(default)]
    pub device_store_uuid: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DriveInfo {
    pub fn new(location_code: &str, device_name: &str) -> Self {
        Self {
            location_code: location_code.to_string(),
            device_name: device_name.to_string(),
            device_store_uuid: new_uuid(),
            extra: Map::new(),
        }
    }

    /// Load the device info below the book root, or create it from the
    /// defaults when there is none yet.
    #[instrument(skip(book_root), fields(root = %book_root.as_ref().display()))]
    pub async fn load_or_new(book_root: impl AsRef<Path>, location_code: &str, device_name: &str) -> Result<Self> {
        let path = book_root.as_ref().join(DRIVEINFO_FILE);
        Ok(match json::read(&path).await? {
            Some(info) => info,
            None => {
                tracing::info!("no device info found, creating it");
                Self::new(location_code, device_name)
            },
        })
    }

    pub async fn save(&self, book_root: impl AsRef<Path>) -> Result<()> {
        json::write(&book_root.as_ref().join(DRIVEINFO_FILE), self).await
    }
}

/// Content IDs whose metadata changed but hasn't reached the catalog yet.
///
/// Persisted so that a session that dies before writing to the catalog
/// doesn't lose track of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtySet {
    path: PathBuf,
    ids: BTreeSet<ContentId>,
}

impl DirtySet {
    /// Load the set left by earlier sessions, if any.
    pub async fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(DIRTY_FILE);
        let ids: BTreeSet<ContentId> = json::read(&path).await?.unwrap_or_default();
        if !ids.is_empty() {
            tracing::info!(pending = ids.len(), "resuming metadata updates from an earlier session");
        }
        Ok(Self { path, ids })
    }

    pub fn insert(&mut self, id: ContentId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &ContentId) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentId> {
        self.ids.iter()
    }

    /// Write the set, or remove the file once there's nothing left.
    pub async fn save(&self) -> Result<()> {
        match self.ids.is_empty() {
            true => json::remove(&self.path).await,
            false => json::write(&self.path, &self.ids).await,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
