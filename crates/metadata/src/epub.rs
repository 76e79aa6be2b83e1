//! Metadata embedded in EPUB files.
//!
//! Only used for books Nickel knows about but the cache doesn't, typically
//! ones copied to the device over USB. Calibre writes its own metadata into
//! the OPF package document, so for books that passed through Calibre this
//! recovers nearly everything the cache would have held.

use exn::ResultExt;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{ErrorKind, Result};
use crate::record::{BookRecord, parse_opf_date};

/// MIME types worth opening.
pub const EPUB_MIME_TYPES: [&str; 2] = ["application/epub+zip", "application/x-kobo-epub+zip"];

const CONTAINER_PATH: &str = "META-INF/container.xml";

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(ROOTFILE_SELECTOR, "rootfile[full-path]");
selector!(IDENTIFIER_SELECTOR, r"dc\:identifier");
selector!(TITLE_SELECTOR, r"dc\:title");
selector!(DESCRIPTION_SELECTOR, r"dc\:description");
selector!(LANGUAGE_SELECTOR, r"dc\:language");
selector!(CREATOR_SELECTOR, r"dc\:creator");
selector!(PUBLISHER_SELECTOR, r"dc\:publisher");
selector!(DATE_SELECTOR, r"dc\:date");
selector!(META_SELECTOR, "meta[name][content]");

/// Metadata read from an OPF package document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpubMetadata {
    /// Calibre's own UUID if present, the `uuid` scheme identifier otherwise.
    pub uuid: Option<String>,
    /// Every other identifier, by scheme.
    pub identifiers: BTreeMap<String, String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub languages: Vec<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub pubdate: Option<String>,
    pub timestamp: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
    pub title_sort: Option<String>,
    pub author_link_map: BTreeMap<String, String>,
}

fn text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn first(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(text)
}

impl EpubMetadata {
    /// Parse an OPF package document.
    ///
    /// OPF is XML, but only a handful of flat elements are of interest, and
    /// the lenient HTML parser copes with the malformed documents real
    /// EPUBs ship with. Element and attribute names keep their namespace
    /// prefix (`dc:title`, `opf:scheme`).
    pub fn parse_opf(opf: &str) -> Self {
        let document = Html::parse_document(opf);
        let mut metadata = Self {
            title: first(&document, &TITLE_SELECTOR),
            description: first(&document, &DESCRIPTION_SELECTOR),
            publisher: first(&document, &PUBLISHER_SELECTOR),
            pubdate: first(&document, &DATE_SELECTOR).as_deref().and_then(parse_opf_date),
            languages: document.select(&LANGUAGE_SELECTOR).filter_map(text).collect(),
            ..Self::default()
        };

        let mut uuid_scheme = None;
        for element in document.select(&IDENTIFIER_SELECTOR) {
            let Some(value) = text(element) else { continue };
            let attrs = element.value();
            let Some(scheme) = attrs.attr("opf:scheme").or_else(|| attrs.attr("scheme")) else { continue };
            match scheme.to_lowercase().as_str() {
                "calibre" => metadata.uuid = Some(value),
                "uuid" => uuid_scheme = Some(value),
                _ => {
                    metadata.identifiers.insert(scheme.to_string(), value);
                },
            }
        }
        metadata.uuid = metadata.uuid.or(uuid_scheme);

        for element in document.select(&CREATOR_SELECTOR) {
            let attrs = element.value();
            let role = attrs.attr("opf:role").or_else(|| attrs.attr("role"));
            if matches!(role, None | Some("aut")) {
                metadata.authors.extend(text(element));
            }
        }

        for element in document.select(&META_SELECTOR) {
            let attrs = element.value();
            let (Some(name), Some(content)) = (attrs.attr("name"), attrs.attr("content")) else { continue };
            match name {
                "calibre:timestamp" => metadata.timestamp = parse_opf_date(content),
                "calibre:series" => metadata.series = Some(content.to_string()).filter(|s| !s.is_empty()),
                "calibre:series_index" => metadata.series_index = content.trim().parse().ok(),
                "calibre:title_sort" => metadata.title_sort = Some(content.to_string()).filter(|s| !s.is_empty()),
                "calibre:author_link_map" => match serde_json::from_str(content) {
                    Ok(map) => metadata.author_link_map = map,
                    Err(err) => tracing::debug!("ignoring malformed author link map: {err}"),
                },
                _ => {},
            }
        }
        metadata
    }

    /// Open an EPUB and read the metadata from its package document.
    ///
    /// Blocking; run it off the async runtime.
    pub fn read(path: &Path) -> Result<Self> {
        let invalid = || ErrorKind::InvalidEpub(path.to_path_buf());
        let file = std::fs::File::open(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).or_raise(invalid)?;
        let container = read_entry(&mut archive, CONTAINER_PATH).or_raise(invalid)?;
        let container = Html::parse_document(&container);
        let opf_path = container
            .select(&ROOTFILE_SELECTOR)
            .find_map(|el| el.value().attr("full-path"))
            .map(String::from);
        let Some(opf_path) = opf_path else {
            exn::bail!(invalid());
        };
        let opf = read_entry(&mut archive, &opf_path).or_raise(invalid)?;
        Ok(Self::parse_opf(&opf))
    }

    /// Fill the record's gaps. Anything the record already has wins.
    pub fn fill(self, record: &mut BookRecord) {
        if let Some(uuid) = self.uuid {
            record.uuid = uuid;
        }
        if record.title.is_empty() {
            record.title = self.title.unwrap_or_default();
        }
        if record.authors.is_empty() {
            record.authors = self.authors;
        }
        record.comments = record.comments.take().or(self.description);
        record.publisher = record.publisher.take().or(self.publisher);
        record.series = record.series.take().or(self.series);
        record.series_index = record.series_index.or(self.series_index);
        record.pubdate = record.pubdate.take().or(self.pubdate);
        record.timestamp = record.timestamp.take().or(self.timestamp);
        record.title_sort = record.title_sort.take().or(self.title_sort);
        if record.languages.is_empty() {
            record.languages = self.languages;
        }
        for (scheme, value) in self.identifiers {
            record.identifiers.entry(scheme).or_insert(value);
        }
        if record.author_link_map.is_empty() {
            record.author_link_map = self.author_link_map;
        }
    }
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> std::io::Result<String> {
    let mut entry = archive.by_name(name)?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(contents)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="uuid_id" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:identifier opf:scheme="uuid" id="uuid_id">0a1b2c3d-0000-4000-8000-000000000000</dc:identifier>
    <dc:identifier opf:scheme="calibre">9f8e7d6c-0000-4000-8000-000000000000</dc:identifier>
    <dc:identifier opf:scheme="ISBN">9780000000000</dc:identifier>
    <dc:title>The Colour of Magic</dc:title>
    <dc:creator opf:file-as="Pratchett, Terry" opf:role="aut">Terry Pratchett</dc:creator>
    <dc:creator opf:role="ill">Josh Kirby</dc:creator>
    <dc:description>&lt;p&gt;Rincewind &amp;amp; Twoflower.&lt;/p&gt;</dc:description>
    <dc:publisher>Colin Smythe</dc:publisher>
    <dc:date>1983-11-24T00:00:00+00:00</dc:date>
    <dc:language>en</dc:language>
    <meta name="calibre:series" content="Discworld"/>
    <meta name="calibre:series_index" content="1.0"/>
    <meta name="calibre:timestamp" content="2020-01-02T03:04:05+00:00"/>
    <meta name="calibre:title_sort" content="Colour of Magic, The"/>
    <meta name="calibre:author_link_map" content="{&quot;Terry Pratchett&quot;: &quot;&quot;}"/>
    <meta name="cover" content="cover"/>
  </metadata>
  <manifest>
    <item href="text.html" id="text" media-type="application/xhtml+xml"/>
  </manifest>
</package>"#;

    pub(crate) fn write_epub(path: &Path, opf: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("mimetype", options.compression_method(zip::CompressionMethod::Stored)).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file(CONTAINER_PATH, options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        )
        .unwrap();
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(opf.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn parses_calibre_opf() {
        let metadata = EpubMetadata::parse_opf(OPF);
        assert_eq!(metadata.uuid.as_deref(), Some("9f8e7d6c-0000-4000-8000-000000000000"));
        assert_eq!(metadata.identifiers, BTreeMap::from([("ISBN".to_string(), "9780000000000".to_string())]));
        assert_eq!(metadata.title.as_deref(), Some("The Colour of Magic"));
        assert_eq!(metadata.authors, vec!["Terry Pratchett"]);
        assert_eq!(metadata.description.as_deref(), Some("<p>Rincewind &amp; Twoflower.</p>"));
        assert_eq!(metadata.publisher.as_deref(), Some("Colin Smythe"));
        assert_eq!(metadata.pubdate.as_deref(), Some("1983-11-24T00:00:00Z"));
        assert_eq!(metadata.languages, vec!["en"]);
        assert_eq!(metadata.series.as_deref(), Some("Discworld"));
        assert_eq!(metadata.series_index, Some(1.0));
        assert_eq!(metadata.timestamp.as_deref(), Some("2020-01-02T03:04:05Z"));
        assert_eq!(metadata.title_sort.as_deref(), Some("Colour of Magic, The"));
        assert_eq!(metadata.author_link_map["Terry Pratchett"], "");
    }

    #[test]
    fn uuid_scheme_is_a_fallback() {
        let opf = OPF.replace(r#"<dc:identifier opf:scheme="calibre">9f8e7d6c-0000-4000-8000-000000000000</dc:identifier>"#, "");
        let metadata = EpubMetadata::parse_opf(&opf);
        assert_eq!(metadata.uuid.as_deref(), Some("0a1b2c3d-0000-4000-8000-000000000000"));
    }

    #[test]
    fn fills_only_gaps() {
        let mut record = BookRecord {
            title: "Catalog Title".to_string(),
            series: Some("Catalog Series".to_string()),
            ..BookRecord::new("Pratchett/Colour.epub")
        };
        record.identifiers.insert("ISBN".to_string(), "catalog".to_string());
        EpubMetadata::parse_opf(OPF).fill(&mut record);
        assert_eq!(record.title, "Catalog Title");
        assert_eq!(record.series.as_deref(), Some("Catalog Series"));
        assert_eq!(record.series_index, Some(1.0));
        assert_eq!(record.authors, vec!["Terry Pratchett"]);
        assert_eq!(record.identifiers["ISBN"], "catalog");
        assert_eq!(record.uuid, "9f8e7d6c-0000-4000-8000-000000000000");
    }

    #[test]
    fn reads_epub_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(&path, OPF);
        let metadata = EpubMetadata::read(&path).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("The Colour of Magic"));
    }

    #[test]
    fn rejects_non_epub() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        let err = EpubMetadata::read(&path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidEpub(_)));

        let err = EpubMetadata::read(&dir.path().join("missing.epub")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io(_)));
    }
}
