use derive_more::Display;
use exn::{OptionExt, ResultExt};
use std::path::Path;
use tracing::instrument;

use crate::Device;
use crate::error::{ErrorKind, Result};

/// Location of the firmware version file, relative to the onboard root.
pub const VERSION_FILE: &str = ".kobo/version";

/// Firmware version, e.g. `4.20.14622`.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{major}.{minor}.{build}")]
pub struct Firmware {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl Firmware {
    fn parse(s: &str) -> Result<Self> {
        let malformed = || ErrorKind::Malformed(format!("firmware version {s:?}"));
        let mut parts = s.trim().splitn(3, '.').map(str::parse::<u32>);
        let mut next = || -> Result<u32> { parts.next().ok_or_raise(malformed)?.or_raise(malformed) };
        Ok(Self { major: next()?, minor: next()?, build: next()? })
    }
}

/// Contents of `.kobo/version`.
///
/// The file is a single comma separated line: serial number, kernel version,
/// firmware version, two more version strings, then the model ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    pub serial: String,
    pub firmware: Firmware,
    pub device: Device,
}

impl VersionInfo {
    pub fn parse(contents: &str) -> Result<Self> {
        let fields: Vec<&str> = contents.trim().split(',').map(str::trim).collect();
        if fields.len() < 4 {
            exn::bail!(ErrorKind::Malformed(format!("expected at least 4 fields, found {}", fields.len())));
        }
        let model_id = fields[fields.len() - 1];
        Ok(Self {
            serial: fields[0].to_string(),
            firmware: Firmware::parse(fields[2])?,
            device: model_id.parse()?,
        })
    }

    /// Read the version file below the onboard root.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn read(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(VERSION_FILE);
        let contents = tokio::fs::read_to_string(&path).await.or_raise(|| ErrorKind::Unreadable(path.clone()))?;
        let info = Self::parse(&contents)?;
        tracing::debug!(model = info.device.model(), firmware = %info.firmware, "identified device");
        Ok(info)
    }
}
