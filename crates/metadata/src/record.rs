use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Calibre's cover thumbnail: `[width, height, base64 JPEG]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail(pub u32, pub u32, pub String);

impl Thumbnail {
    pub fn width(&self) -> u32 {
        self.0
    }

    pub fn height(&self) -> u32 {
        self.1
    }

    pub fn data(&self) -> &str {
        &self.2
    }

    pub fn into_data(self) -> String {
        self.2
    }
}

/// One book, as Calibre describes it.
///
/// The fields nickelsync reads or computes are typed. Everything else Calibre
/// sends (tags, ratings, custom columns...) is carried in `extra` and handed
/// back untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub lpath: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_index: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub languages: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub pubdate: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub title_sort: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_link_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl BookRecord {
    pub fn new(lpath: impl Into<String>) -> Self {
        Self { lpath: lpath.into(), uuid: new_uuid(), ..Self::default() }
    }

    /// The file extension of the lpath, with its dot (`.epub`), as Calibre
    /// expects in a book listing.
    pub fn extension(&self) -> &str {
        let name = self.lpath.rsplit('/').next().unwrap_or(&self.lpath);
        name.rfind('.').map_or("", |dot| &name[dot..])
    }

    /// When the book file was last modified, if known and well-formed.
    pub fn last_modified(&self) -> Option<OffsetDateTime> {
        self.last_modified.as_deref().and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
    }
}

/// A random (v4) UUID in its hyphenated form.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Calibre's timestamp format.
pub fn format_timestamp(at: OffsetDateTime) -> Option<String> {
    at.format(&Rfc3339).ok()
}

/// Normalise a date from an OPF file: full RFC 3339 timestamps are kept,
/// bare `YYYY-MM-DD` dates become midnight UTC, anything else is dropped.
pub fn parse_opf_date(value: &str) -> Option<String> {
    let value = value.trim();
    if let Ok(at) = OffsetDateTime::parse(value, &Rfc3339) {
        return format_timestamp(at);
    }
    let date = Date::parse(value.get(..10)?, format_description!("[year]-[month]-[day]")).ok()?;
    format_timestamp(date.midnight().assume_utc())
}
