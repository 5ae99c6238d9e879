//! Input path validation
//!
//! These checks belong to whoever accepts a file from the user. The processor
//! repeats only the read itself and reports an I/O error if that fails.

use crate::error::{BgRemovalError, Result};
use std::path::Path;

/// Extensions accepted as input, lowercase without the dot
pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "webp", "bmp", "tiff", "tif"];

/// Validator for input image paths
pub struct PathValidator;

impl PathValidator {
    /// Check if a file path has a supported image extension (case-insensitive)
    pub fn is_supported_image_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| {
                let ext_lower = ext.to_lowercase();
                SUPPORTED_INPUT_EXTENSIONS.contains(&ext_lower.as_str())
            })
    }

    /// Validate that a path has a supported image extension
    pub fn validate_image_extension<P: AsRef<Path>>(path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if !Self::is_supported_image_format(path_ref) {
            let extension = path_ref
                .extension()
                .and_then(|s| s.to_str())
                .map_or_else(|| "(no extension)".to_string(), |ext| format!(".{ext}"));

            return Err(BgRemovalError::configuration(format!(
                "Unsupported format {}. Supported formats: {}",
                extension,
                SUPPORTED_INPUT_EXTENSIONS.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate that a file exists
    pub fn validate_file_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        let path_ref = path.as_ref();
        if !path_ref.is_file() {
            return Err(BgRemovalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path_ref.display()),
            )));
        }
        Ok(())
    }

    /// Run both checks the way a drop target would: existence first, then format
    pub fn validate_input_image<P: AsRef<Path>>(path: P) -> Result<()> {
        let path_ref = path.as_ref();
        Self::validate_file_exists(path_ref)?;
        Self::validate_image_extension(path_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions_case_insensitive() {
        for name in [
            "a.png", "a.PNG", "a.jpg", "a.JPEG", "a.webp", "a.bmp", "a.tiff", "a.TIF",
        ] {
            assert!(PathValidator::is_supported_image_format(name), "{name}");
        }
        for name in ["a.gif", "a.txt", "noext", "a.png.bak"] {
            assert!(!PathValidator::is_supported_image_format(name), "{name}");
        }
    }

    #[test]
    fn test_unsupported_extension_message() {
        let err = PathValidator::validate_image_extension("photo.gif").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Unsupported format .gif"));

        let err = PathValidator::validate_image_extension("photo").unwrap_err();
        assert!(err.to_string().contains("(no extension)"));
    }

    #[test]
    fn test_validate_input_image() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.png");
        let err = PathValidator::validate_input_image(&missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("File not found"));

        let wrong = dir.path().join("notes.txt");
        std::fs::write(&wrong, b"hello").unwrap();
        let err = PathValidator::validate_input_image(&wrong).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let good = dir.path().join("cat.JPG");
        std::fs::write(&good, b"not really a jpeg").unwrap();
        assert!(PathValidator::validate_input_image(&good).is_ok());
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("folder.png");
        std::fs::create_dir(&folder).unwrap();
        assert!(PathValidator::validate_file_exists(&folder).is_err());
    }
}
