//! User configuration.
//!
//! Options live in a TOML file inside the device's add-on directory and can be
//! overridden with `NICKELSYNC_`-prefixed environment variables (nested keys
//! separated by `__`, e.g. `NICKELSYNC_THUMBNAIL__JPEG_QUALITY=75`).
//!
//! Thumbnail options are never rejected: anything unrecognised falls back to
//! its default with a warning, so a typo can't stop a sync.

pub mod error;

use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use nickelsync_cover::{CoverOptions, DEFAULT_JPEG_QUALITY, GenerateLevel, ResizeFilter};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ErrorKind, Result};

/// Location of the config file, relative to the onboard root.
pub const CONFIG_FILE: &str = ".adds/nickelsync/config.toml";
/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "NICKELSYNC_";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store books on the SD card, when one is inserted.
    pub prefer_sd_card: bool,
    /// List kepub before epub in the formats offered to Calibre.
    pub prefer_kepub: bool,
    /// Passwords tried, in order, when Calibre asks for one.
    pub password_list: Vec<String>,
    /// Log at debug level.
    pub enable_debug: bool,
    /// Stage metadata for books Nickel hasn't imported yet in a table applied
    /// by an insert trigger, instead of a deferred SQL script.
    pub add_metadata_by_trigger: bool,
    pub thumbnail: ThumbnailConfig,
}

/// The `[thumbnail]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// `all`, `partial` or `none`.
    pub generate_level: String,
    /// `bilinear`, `bicubic`, `lanczos2` or `lanczos3`.
    pub resize_algorithm: String,
    /// `1` to `100`.
    pub jpeg_quality: i64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self::from(CoverOptions::default())
    }
}

impl From<CoverOptions> for ThumbnailConfig {
    fn from(options: CoverOptions) -> Self {
        Self {
            generate_level: options.level.to_string(),
            resize_algorithm: options.filter.to_string(),
            jpeg_quality: i64::from(options.quality),
        }
    }
}

impl ThumbnailConfig {
    /// Interpret the options, substituting defaults for anything invalid.
    pub fn cover_options(&self) -> CoverOptions {
        let level = self.generate_level.parse::<GenerateLevel>().unwrap_or_else(|_| {
            tracing::warn!(value = %self.generate_level, "unknown thumbnail generate level, using default");
            GenerateLevel::default()
        });
        let filter = self.resize_algorithm.parse::<ResizeFilter>().unwrap_or_else(|_| {
            tracing::warn!(value = %self.resize_algorithm, "unknown thumbnail resize algorithm, using default");
            ResizeFilter::default()
        });
        let quality = match u8::try_from(self.jpeg_quality) {
            Ok(quality @ 1..=100) => quality,
            _ => {
                tracing::warn!(value = self.jpeg_quality, "thumbnail JPEG quality out of range, using default");
                DEFAULT_JPEG_QUALITY
            },
        };
        CoverOptions { level, filter, quality }
    }

    /// Rewrite the options in their canonical form.
    pub fn normalize(&mut self) {
        *self = Self::from(self.cover_options());
    }
}

impl Config {
    /// Load the config from below the onboard root.
    ///
    /// A missing file is not an error; every option has a default.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        Self::load_file(root.as_ref().join(CONFIG_FILE))
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = Self::figment(path).extract().or_raise(|| ErrorKind::Invalid)?;
        config.thumbnail.normalize();
        let filter = config.cover_options().filter;
        if !filter.is_exact() {
            tracing::info!(
                %filter,
                substitute = ?filter.filter_type(),
                "resize algorithm not available, using closest match"
            );
        }
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Defaults, overlaid with the file, overlaid with the environment.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Write the config back below the onboard root.
    pub fn save(&self, root: impl AsRef<Path>) -> Result<()> {
        let path = root.as_ref().join(CONFIG_FILE);
        let contents = toml::to_string_pretty(self).or_raise(|| ErrorKind::Invalid)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
        }
        std::fs::write(&path, contents).or_raise(|| ErrorKind::Io(path.clone()))
    }

    pub fn cover_options(&self) -> CoverOptions {
        self.thumbnail.cover_options()
    }
}
