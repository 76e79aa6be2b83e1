use derive_more::Display;
use nickelsync_device::{Device, Size};
use std::path::PathBuf;

/// Size of the cover shown on a book's details page.
pub const LIBRARY_FULL: Size = Size::new(355, 530);
/// Size of the cover shown in the library grid.
pub const LIBRARY_GRID: Size = Size::new(149, 223);

/// The three cover images Nickel keeps for every book.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum CoverClass {
    /// Full screen, used for the sleep screen and book opening.
    #[display("N3_FULL")]
    Full,
    #[display("N3_LIBRARY_FULL")]
    LibraryFull,
    #[display("N3_LIBRARY_GRID")]
    LibraryGrid,
}

/// How a source image is fitted into a cover class's bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fit {
    /// Scale so the whole image fits inside the bounds.
    Letterbox,
    /// Scale so the image covers the bounds entirely.
    Expand,
}

impl CoverClass {
    pub const ALL: [CoverClass; 3] = [Self::Full, Self::LibraryFull, Self::LibraryGrid];

    pub const fn fit(self) -> Fit {
        match self {
            Self::Full => Fit::Letterbox,
            Self::LibraryFull | Self::LibraryGrid => Fit::Expand,
        }
    }

    /// Bounds the cover is fitted into on the given device.
    pub const fn bounds(self, device: Device) -> Size {
        match self {
            Self::Full => device.full_cover(),
            Self::LibraryFull => LIBRARY_FULL,
            Self::LibraryGrid => LIBRARY_GRID,
        }
    }

    /// Size a source image of `size` is resized to for this class.
    pub fn target_size(self, device: Device, size: Size) -> Size {
        resize_keep_aspect(size, self.bounds(device), self.fit() == Fit::Expand)
    }

    /// Path of the cover file, relative to the volume's image directory.
    ///
    /// ```
    /// use nickelsync_cover::CoverClass;
    /// let path = CoverClass::LibraryGrid.relative_path("file____mnt_onboard_perftesting_book0_kepub_epub");
    /// assert_eq!(
    ///     path.to_str().unwrap(),
    ///     "50/74/file____mnt_onboard_perftesting_book0_kepub_epub - N3_LIBRARY_GRID.parsed",
    /// );
    /// ```
    pub fn relative_path(self, image_id: &str) -> PathBuf {
        let (dir1, dir2) = hashed_dirs(image_id);
        PathBuf::from(dir1.to_string()).join(dir2.to_string()).join(format!("{image_id} - {self}.parsed"))
    }
}

/// Scale `size` to `bounds` while keeping its aspect ratio, mirroring Qt's
/// `QSize::scaled` with `KeepAspectRatio` (letterbox) and
/// `KeepAspectRatioByExpanding` (expand).
///
/// An empty size is returned untouched.
pub fn resize_keep_aspect(size: Size, bounds: Size, expand: bool) -> Size {
    if size.is_empty() {
        return size;
    }
    let (w, h) = (u64::from(size.width), u64::from(size.height));
    let scaled_width = clamp(u64::from(bounds.height) * w / h);
    let use_height = match expand {
        true => scaled_width >= bounds.width,
        false => scaled_width <= bounds.width,
    };
    match use_height {
        true => Size::new(scaled_width, bounds.height),
        false => Size::new(bounds.width, clamp(u64::from(bounds.width) * h / w)),
    }
}

fn clamp(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// The two shard directories Nickel's image cache stores an image ID under.
///
/// This is the firmware's own string hash; both values are in `0..=255`.
pub fn hashed_dirs(image_id: &str) -> (u32, u32) {
    let mut h: u32 = 0;
    for &byte in image_id.as_bytes() {
        h = (h << 4).wrapping_add(u32::from(byte));
        h ^= (h & 0xf000_0000) >> 23;
        h &= 0x0fff_ffff;
    }
    (h & 0xff, (h & 0xff00) >> 8)
}
