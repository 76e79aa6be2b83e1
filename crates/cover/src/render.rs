use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use exn::ResultExt;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use nickelsync_device::{Device, Size};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::{CoverClass, CoverOptions};

/// Decode the base64 thumbnail Calibre attaches to a book's metadata.
pub fn decode_thumbnail(data: &str) -> Result<DynamicImage> {
    let bytes = BASE64_STANDARD.decode(data.trim()).or_raise(|| ErrorKind::InvalidThumbnail)?;
    image::load_from_memory(&bytes).or_raise(|| ErrorKind::InvalidThumbnail)
}

fn size_of(image: &DynamicImage) -> Size {
    Size::new(image.width(), image.height())
}

/// Renders the cover files for one book.
///
/// Blocking; run it on a blocking thread.
#[derive(Clone, Debug)]
pub struct CoverRenderer {
    device: Device,
    /// Absolute path of the volume's image directory.
    image_root: PathBuf,
    options: CoverOptions,
}

impl CoverRenderer {
    pub fn new(device: Device, image_root: impl Into<PathBuf>, options: CoverOptions) -> Self {
        Self { device, image_root: image_root.into(), options }
    }

    pub fn options(&self) -> &CoverOptions {
        &self.options
    }

    /// Write every configured cover class for `image_id`.
    ///
    /// A failing class is logged and skipped. Returns the paths that were
    /// written.
    pub fn render(&self, source: DynamicImage, image_id: &str) -> Vec<PathBuf> {
        let mut source = source;
        let mut written = Vec::new();
        for &class in self.options.level.classes() {
            let size = size_of(&source);
            let target = class.target_size(self.device, size);
            tracing::debug!(%class, from = %size, to = %target, bounds = %class.bounds(self.device), "resizing cover");
            let resized = match size == target {
                true => source.clone(),
                false => source.resize_exact(target.width, target.height, self.options.filter.filter_type()),
            };
            // The grid cover is always derived from the library cover.
            if class == CoverClass::LibraryFull {
                source = resized.clone();
            }
            let path = self.image_root.join(class.relative_path(image_id));
            match self.write(class, &resized, &path) {
                Ok(()) => written.push(path),
                Err(err) => tracing::warn!(%class, path = %path.display(), "skipping cover: {err:?}"),
            }
        }
        written
    }

    fn write(&self, class: CoverClass, image: &DynamicImage, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
        }
        // Nickel never regenerates a cover that exists, so a half-written file
        // must never appear under the final name.
        let partial = path.with_extension("parsed.part");
        let file = File::create(&partial).or_raise(|| ErrorKind::Io(partial.clone()))?;
        let mut writer = BufWriter::new(file);
        let encoded = JpegEncoder::new_with_quality(&mut writer, self.options.quality)
            .encode_image(&image.to_rgb8())
            .or_raise(|| ErrorKind::Encode(class));
        if let Err(err) = encoded {
            _ = std::fs::remove_file(&partial);
            return Err(err);
        }
        let finished = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .or_raise(|| ErrorKind::Io(partial.clone()))
            .and_then(|_| std::fs::rename(&partial, path).or_raise(|| ErrorKind::Io(path.to_path_buf())));
        if finished.is_err() {
            _ = std::fs::remove_file(&partial);
        }
        finished
    }
}
