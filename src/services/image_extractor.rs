use crate::error::Result;
use crate::models::question::IMAGE_DIR_NAME;
use crate::services::image_cache::{canonical_png, digest, is_emf, is_wmf, CacheOutcome, ImageCache};
use crate::services::workbook::SheetSnapshot;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Native encodings the extractor keeps as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Emf,
    Wmf,
}

impl ImageKind {
    /// Sniffs the encoding; `None` for anything outside the kept formats.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if is_emf(bytes) {
            return Some(ImageKind::Emf);
        }
        if is_wmf(bytes) {
            return Some(ImageKind::Wmf);
        }
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Png => Some(ImageKind::Png),
            image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            image::ImageFormat::Gif => Some(ImageKind::Gif),
            image::ImageFormat::Bmp => Some(ImageKind::Bmp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Gif => "gif",
            ImageKind::Bmp => "bmp",
            ImageKind::Emf => "emf",
            ImageKind::Wmf => "wmf",
        }
    }
}

/// Turns cells into storable strings, writing each distinct picture once.
pub struct ImageExtractor<'a> {
    cache: &'a ImageCache,
    images_dir: PathBuf,
    written: Cell<usize>,
    reused: Cell<usize>,
}

impl<'a> ImageExtractor<'a> {
    /// `images_dir` must already exist.
    pub fn new(cache: &'a ImageCache, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            images_dir: images_dir.into(),
            written: Cell::new(0),
            reused: Cell::new(0),
        }
    }

    pub fn images_written(&self) -> usize {
        self.written.get()
    }

    pub fn images_reused(&self) -> usize {
        self.reused.get()
    }

    /// Value to store for the 1-based cell (`row`, `col`): the displayed text
    /// for string cells, otherwise the relative path of the picture drawn over
    /// the cell, otherwise the displayed text (possibly empty).
    pub fn extract(&self, sheet: &SheetSnapshot, row: u32, col: u32) -> Result<String> {
        if let Some(cell) = sheet.cell(row, col) {
            if cell.is_text {
                return Ok(cell.display.clone());
            }
        }

        match sheet.picture_at(row, col) {
            Some(picture) => self.store_picture(&picture.data),
            None => Ok(sheet.display_text(row, col).to_string()),
        }
    }

    fn store_picture(&self, data: &[u8]) -> Result<String> {
        let canonical = match canonical_png(data) {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bytes = data.len(),
                    "Picture could not be decoded, storing it as-is"
                );
                None
            }
        };
        let hash = match &canonical {
            Some(png) => digest(png),
            None => digest(data),
        };

        let (path, outcome) = self.cache.get_or_write(&hash, || {
            let (extension, bytes) = match (ImageKind::detect(data), canonical.as_deref()) {
                (Some(kind), _) => (kind.extension(), data),
                (None, Some(png)) => ("png", png),
                (None, None) => ("png", data),
            };
            let file_name = format!("{}.{}", Uuid::new_v4(), extension);
            write_image(&self.images_dir, &file_name, bytes)?;
            tracing::debug!(file = %file_name, "Stored extracted image");
            Ok(format!("{}/{}", IMAGE_DIR_NAME, file_name))
        })?;

        match outcome {
            CacheOutcome::Hit => self.reused.set(self.reused.get() + 1),
            CacheOutcome::Written => self.written.set(self.written.get() + 1),
        }
        Ok(path)
    }
}

fn write_image(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<()> {
    std::fs::write(dir.join(file_name), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(color: [u8; 3], format: image::ImageFormat) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 2, image::Rgb(color)));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn text_cells_come_back_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let text = "  Ünïcødé  with\ttabs and trailing space ";
        let sheet = SheetSnapshot::new()
            .with_text(2, 1, text)
            .with_picture(2, 1, encoded([1, 2, 3], image::ImageFormat::Png));

        assert_eq!(extractor.extract(&sheet, 2, 1).unwrap(), text);
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn non_text_cell_without_picture_falls_back_to_display() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let sheet = SheetSnapshot::new().with_value(2, 3, "3.5");

        assert_eq!(extractor.extract(&sheet, 2, 3).unwrap(), "3.5");
        assert_eq!(extractor.extract(&sheet, 2, 4).unwrap(), "");
    }

    #[test]
    fn picture_is_written_with_native_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let jpeg = encoded([90, 120, 200], image::ImageFormat::Jpeg);
        let sheet = SheetSnapshot::new().with_picture(3, 5, jpeg.clone());

        let path = extractor.extract(&sheet, 3, 5).unwrap();
        assert!(path.starts_with("Images/"));
        assert!(path.ends_with(".jpg"));

        let files = files_in(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), jpeg);
        assert_eq!(extractor.images_written(), 1);
    }

    #[test]
    fn identical_pictures_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let png = encoded([5, 5, 5], image::ImageFormat::Png);
        let bmp = encoded([5, 5, 5], image::ImageFormat::Bmp);
        let sheet = SheetSnapshot::new()
            .with_picture(2, 4, png)
            .with_picture(3, 6, bmp);

        let first = extractor.extract(&sheet, 2, 4).unwrap();
        let second = extractor.extract(&sheet, 3, 6).unwrap();
        assert_eq!(first, second);
        assert_eq!(files_in(dir.path()).len(), 1);
        assert_eq!(extractor.images_written(), 1);
        assert_eq!(extractor.images_reused(), 1);
    }

    #[test]
    fn cache_outlives_a_single_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let png = encoded([7, 8, 9], image::ImageFormat::Png);
        let sheet = SheetSnapshot::new().with_picture(2, 2, png);

        let first = ImageExtractor::new(&cache, dir.path()).extract(&sheet, 2, 2).unwrap();
        let second = ImageExtractor::new(&cache, dir.path()).extract(&sheet, 2, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(files_in(dir.path()).len(), 1);
    }

    #[test]
    fn unrecognized_format_is_stored_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let tiff = encoded([1, 1, 1], image::ImageFormat::Tiff);
        let sheet = SheetSnapshot::new().with_picture(2, 1, tiff);

        let path = extractor.extract(&sheet, 2, 1).unwrap();
        assert!(path.ends_with(".png"));
        let stored = std::fs::read(&files_in(dir.path())[0]).unwrap();
        assert_eq!(ImageKind::detect(&stored), Some(ImageKind::Png));
    }

    fn emf_bytes() -> Vec<u8> {
        let mut emf = vec![0u8; 88];
        emf[0] = 0x01;
        emf[40..44].copy_from_slice(b" EMF");
        emf
    }

    #[test]
    fn metafile_picture_is_stored_raw_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let sheet = SheetSnapshot::new()
            .with_picture(2, 4, emf_bytes())
            .with_picture(3, 4, emf_bytes());

        let first = extractor.extract(&sheet, 2, 4).unwrap();
        let second = extractor.extract(&sheet, 3, 4).unwrap();
        assert!(first.ends_with(".emf"), "got {}", first);
        assert_eq!(first, second);

        let files = files_in(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), emf_bytes());
        assert_eq!(extractor.images_written(), 1);
        assert_eq!(extractor.images_reused(), 1);
    }

    #[test]
    fn undecodable_picture_defaults_to_png_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ImageCache::new();
        let extractor = ImageExtractor::new(&cache, dir.path());
        let raw = vec![0x00, 0x01, 0x02, 0x03, 0x04];
        let sheet = SheetSnapshot::new().with_picture(2, 1, raw.clone());

        let path = extractor.extract(&sheet, 2, 1).unwrap();
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(&files_in(dir.path())[0]).unwrap(), raw);
        assert_eq!(cache.len(), 1);
    }
}
