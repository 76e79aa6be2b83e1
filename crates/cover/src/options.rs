use derive_more::Display;
use image::imageops::FilterType;
use nickelsync_device::{Device, Size};
use std::str::FromStr;

use crate::CoverClass;
use crate::error::{Error, ErrorKind};

/// Which cover classes are generated for a transferred book.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum GenerateLevel {
    #[default]
    #[display("all")]
    All,
    /// Library covers only; Nickel renders the full cover itself on demand.
    #[display("partial")]
    Partial,
    #[display("none")]
    None,
}

impl GenerateLevel {
    pub fn classes(self) -> &'static [CoverClass] {
        match self {
            Self::All => &CoverClass::ALL,
            Self::Partial => &CoverClass::ALL[1..],
            Self::None => &[],
        }
    }

    /// The largest cover generated at this level, which is the thumbnail size
    /// to ask Calibre for.
    pub fn thumbnail_size(self, device: Device) -> Size {
        match self {
            Self::All => CoverClass::Full.bounds(device),
            Self::Partial => CoverClass::LibraryFull.bounds(device),
            Self::None => CoverClass::LibraryGrid.bounds(device),
        }
    }
}

impl FromStr for GenerateLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "partial" => Ok(Self::Partial),
            "none" => Ok(Self::None),
            _ => exn::bail!(ErrorKind::InvalidOption(format!("generate level {s:?}"))),
        }
    }
}

/// Resampling filter used when scaling covers.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum ResizeFilter {
    #[display("bilinear")]
    Bilinear,
    #[default]
    #[display("bicubic")]
    Bicubic,
    /// Accepted for compatibility, but rendered with the three-lobe Lanczos
    /// kernel: `image` has no two-lobe one.
    #[display("lanczos2")]
    Lanczos2,
    #[display("lanczos3")]
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos2 | Self::Lanczos3 => FilterType::Lanczos3,
        }
    }

    /// Whether [`filter_type`](Self::filter_type) is the filter that was
    /// asked for, rather than its closest substitute.
    pub fn is_exact(self) -> bool {
        !matches!(self, Self::Lanczos2)
    }
}

impl FromStr for ResizeFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" => Ok(Self::Bilinear),
            "bicubic" => Ok(Self::Bicubic),
            "lanczos2" => Ok(Self::Lanczos2),
            "lanczos3" => Ok(Self::Lanczos3),
            _ => exn::bail!(ErrorKind::InvalidOption(format!("resize algorithm {s:?}"))),
        }
    }
}

/// JPEG quality used when the configured value is out of range.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Everything that controls how covers are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoverOptions {
    pub level: GenerateLevel,
    pub filter: ResizeFilter,
    /// JPEG quality, `1..=100`.
    pub quality: u8,
}

impl Default for CoverOptions {
    fn default() -> Self {
        Self { level: GenerateLevel::default(), filter: ResizeFilter::default(), quality: DEFAULT_JPEG_QUALITY }
    }
}
