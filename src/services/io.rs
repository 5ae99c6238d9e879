//! Image file I/O
//!
//! Everything that touches the filesystem on behalf of a processing request
//! lives here, so the processor itself only sequences the steps.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    utils::{MaskPostprocessor, PathValidator},
};
use image::{DynamicImage, RgbaImage};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Read an input file completely into memory
    ///
    /// # Errors
    /// I/O errors carry the operation and the path; a missing file stays `NotFound`.
    pub fn read_input<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        std::fs::read(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("read input image", path_ref, &e))
    }

    /// Decode encoded image bytes into an RGBA buffer, whatever the source layout
    ///
    /// # Errors
    /// Undecodable bytes are a processing error.
    pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::processing(format!("Failed to decode backend output: {e}"))
        })?;
        Ok(match image {
            DynamicImage::ImageRgba8(rgba) => rgba,
            other => other.to_rgba8(),
        })
    }

    /// Load an image from disk, used by the shell for the loaded-image report
    ///
    /// # Errors
    /// Missing files are I/O errors, undecodable content is a processing error.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        let data = Self::read_input(path_ref)?;
        image::load_from_memory(&data).map_err(|e| {
            BgRemovalError::processing(format!(
                "Failed to load image '{}': {}",
                path_ref.display(),
                e
            ))
        })
    }

    /// Write an RGBA image as PNG, replacing the target only once it is complete
    ///
    /// The PNG is encoded into a temporary file next to the target and renamed
    /// over it, so an interrupted write never leaves a truncated output.
    ///
    /// # Errors
    /// Directory creation, encoding and rename failures.
    pub fn save_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();
        let parent = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        std::fs::create_dir_all(&parent)
            .map_err(|e| BgRemovalError::file_io_error("create output directory", &parent, &e))?;

        let temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| BgRemovalError::file_io_error("create temporary file in", &parent, &e))?;

        let encoded = MaskPostprocessor::encode_png(image)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer
                .write_all(&encoded)
                .and_then(|()| writer.flush())
                .map_err(|e| BgRemovalError::file_io_error("write output image", path_ref, &e))?;
        }

        temp.persist(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("write output image", path_ref, &e.error))?;

        log::debug!("Saved {}x{} PNG to {}", image.width(), image.height(), path_ref.display());
        Ok(())
    }

    /// Output location for an input: `<input dir>/<stem><suffix>.<ext>`
    #[must_use]
    pub fn output_path_for<P: AsRef<Path>>(input: P, suffix: &str, format: OutputFormat) -> PathBuf {
        let input_ref = input.as_ref();
        let stem = input_ref
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
        input_ref.with_file_name(format!("{stem}{suffix}.{}", format.extension()))
    }

    /// Whether the path has a supported input extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        PathValidator::is_supported_image_format(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{ImageFormat, Rgba};
    use tempfile::TempDir;

    #[test]
    fn test_output_path_for() {
        let out = ImageIOService::output_path_for("/photos/cat.jpg", "_nobg", OutputFormat::Png);
        assert_eq!(out, PathBuf::from("/photos/cat_nobg.png"));

        let out = ImageIOService::output_path_for("dog.photo.webp", "_cutout", OutputFormat::Png);
        assert_eq!(out, PathBuf::from("dog.photo_cutout.png"));

        let out = ImageIOService::output_path_for("cat.png", "", OutputFormat::Png);
        assert_eq!(out, PathBuf::from("cat.png"));
    }

    #[test]
    fn test_read_missing_input_is_io_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ImageIOService::read_input(dir.path().join("nope.png")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        match err {
            BgRemovalError::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_decode_rgba_normalizes_rgb() {
        let rgb = image::RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        rgb.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let rgba = ImageIOService::decode_rgba(bytes.get_ref()).unwrap();
        assert_eq!(*rgba.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_decode_rgba_rejects_garbage() {
        let err = ImageIOService::decode_rgba(b"garbage").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
    }

    #[test]
    fn test_save_png_round_trip_and_no_leftovers() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("out.png");
        let image = RgbaImage::from_pixel(3, 4, Rgba([9, 8, 7, 6]));

        ImageIOService::save_png(&image, &target).unwrap();

        let reloaded = image::open(&target).unwrap().to_rgba8();
        assert_eq!(reloaded, image);
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1, "temporary file should have been renamed away");
    }

    #[test]
    fn test_save_png_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        std::fs::write(&target, b"old").unwrap();

        let image = RgbaImage::from_pixel(1, 1, Rgba([1, 1, 1, 1]));
        ImageIOService::save_png(&image, &target).unwrap();
        assert_eq!(image::open(&target).unwrap().to_rgba8(), image);
    }
}
