//! Whole-file JSON reads and writes.

use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Read and decode a JSON file.
///
/// A missing or empty file is `None`, not an error.
pub(crate) async fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        result => result.or_raise(|| ErrorKind::Io(path.to_path_buf()))?,
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes).map(Some).or_raise(|| ErrorKind::MalformedJson(path.to_path_buf()))
}

/// Encode with a four-space indent, the way Calibre's own drivers write
/// these files.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer).or_raise(|| ErrorKind::MalformedJson(path.to_path_buf()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Replace a file with the encoded value.
///
/// The new contents are written next to the file and renamed over it, so a
/// crash never leaves a truncated file behind.
pub(crate) async fn write<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = encode(value, path)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
    }
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    tokio::fs::write(&part, bytes).await.or_raise(|| ErrorKind::Io(part.clone()))?;
    tokio::fs::rename(&part, path).await.or_raise(|| ErrorKind::Io(path.to_path_buf()))
}

/// Remove a file if it exists.
pub(crate) async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result.or_raise(|| ErrorKind::Io(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn missing_and_empty_files_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        assert_eq!(read::<Vec<u32>>(&path).await.unwrap(), None);
        std::fs::write(&path, " \n").unwrap();
        assert_eq!(read::<Vec<u32>>(&path).await.unwrap(), None);
        std::fs::write(&path, "{").unwrap();
        let err = read::<Vec<u32>>(&path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedJson(_)));
    }

    #[tokio::test]
    async fn writes_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/file.json");
        let value = BTreeMap::from([("key", vec![1, 2])]);
        write(&path, &value).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\n    \"key\": [\n        1,\n        2\n    ]\n}\n");
        assert_eq!(read::<BTreeMap<String, Vec<u32>>>(&path).await.unwrap().unwrap()["key"], vec![1, 2]);
        assert!(!dir.path().join("nested/file.json.part").exists());

        remove(&path).await.unwrap();
        remove(&path).await.unwrap();
        assert!(!path.exists());
    }
}
