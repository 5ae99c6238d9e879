//! Model weight store
//!
//! Weights live as flat `<model-id>.onnx` files in one directory. The location
//! is `U2NET_HOME` when set, otherwise `~/.u2net`, which is where rembg-style
//! tooling keeps the same files, so an existing download is picked up as is.

use crate::error::{BgRemovalError, Result};
use crate::models::ModelId;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the store location
pub const MODEL_HOME_ENV: &str = "U2NET_HOME";

/// A model file present in the store
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub model: ModelId,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default store, creating the directory if needed
    ///
    /// # Errors
    /// - Home directory cannot be determined and `U2NET_HOME` is unset
    /// - Store directory cannot be created
    pub fn new() -> Result<Self> {
        let cache = Self::with_dir(Self::default_cache_dir()?);
        cache.ensure_dir()?;
        Ok(cache)
    }

    /// Use a specific directory as the store without touching the filesystem
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Resolve the store location from the environment
    ///
    /// # Errors
    /// - Neither `U2NET_HOME` nor a home directory is available
    pub fn default_cache_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(MODEL_HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::home_dir()
            .map(|home| home.join(".u2net"))
            .ok_or_else(|| {
                BgRemovalError::configuration(format!(
                    "Failed to determine home directory. Set {MODEL_HOME_ENV} to choose where models are stored."
                ))
            })
    }

    /// Create the store directory if it does not exist yet
    ///
    /// # Errors
    /// - Directory creation failed
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create model directory", &self.cache_dir, &e)
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the weights for `model` are (or would be) stored
    #[must_use]
    pub fn model_path(&self, model: ModelId) -> PathBuf {
        self.cache_dir.join(model.file_name())
    }

    /// Whether non-empty weights for `model` are present
    #[must_use]
    pub fn is_model_cached(&self, model: ModelId) -> bool {
        fs::metadata(self.model_path(model)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// Resolve the weights path, failing when the model has not been downloaded
    ///
    /// # Errors
    /// - `Io` with `NotFound` when the file is missing
    pub fn require_model(&self, model: ModelId) -> Result<PathBuf> {
        let path = self.model_path(model);
        if self.is_model_cached(model) {
            Ok(path)
        } else {
            Err(BgRemovalError::file_io_error(
                "locate model weights",
                &path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "model has not been downloaded"),
            ))
        }
    }

    /// List the known models present in the store, in catalogue order
    ///
    /// # Errors
    /// - Store directory exists but cannot be read
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }

        let mut models = Vec::new();
        for model in ModelId::ALL {
            let path = self.model_path(model);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => models.push(CachedModelInfo {
                    model,
                    path,
                    size_bytes: meta.len(),
                }),
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(BgRemovalError::file_io_error("inspect model file", &path, &e)),
            }
        }
        Ok(models)
    }

    /// Remove one model's weights; returns whether anything was removed
    ///
    /// # Errors
    /// - File exists but cannot be removed
    pub fn clear_specific_model(&self, model: ModelId) -> Result<bool> {
        let path = self.model_path(model);
        if !path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model);
        fs::remove_file(&path)
            .map_err(|e| BgRemovalError::file_io_error("remove cached model", &path, &e))?;
        Ok(true)
    }

    /// Remove every known model's weights; unrelated files are left alone
    ///
    /// # Errors
    /// - A model file cannot be removed
    pub fn clear_all_models(&self) -> Result<Vec<ModelId>> {
        let mut removed = Vec::new();
        for model in ModelId::ALL {
            if self.clear_specific_model(model)? {
                removed.push(model);
            }
        }
        Ok(removed)
    }
}

/// Human-readable byte count for listings
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS.get(unit).copied().unwrap_or("B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_model_path_uses_flat_file_names() {
        let cache = ModelCache::with_dir("/models");
        assert_eq!(cache.model_path(ModelId::U2Net), PathBuf::from("/models/u2net.onnx"));
        assert_eq!(
            cache.model_path(ModelId::IsnetGeneralUse),
            PathBuf::from("/models/isnet-general-use.onnx")
        );
    }

    #[test]
    fn test_scan_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::with_dir(dir.path());
        assert!(cache.scan_cached_models().unwrap().is_empty());

        fs::write(cache.model_path(ModelId::U2NetP), b"weights").unwrap();
        fs::write(cache.model_path(ModelId::IsnetAnime), b"weights!").unwrap();
        fs::write(cache.model_path(ModelId::U2Net), b"").unwrap(); // interrupted download
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let cached: Vec<ModelId> = cache
            .scan_cached_models()
            .unwrap()
            .iter()
            .map(|info| info.model)
            .collect();
        assert_eq!(cached, vec![ModelId::U2NetP, ModelId::IsnetAnime]);
        assert!(cache.is_model_cached(ModelId::U2NetP));
        assert!(!cache.is_model_cached(ModelId::U2Net));

        assert!(cache.clear_specific_model(ModelId::U2NetP).unwrap());
        assert!(!cache.clear_specific_model(ModelId::U2NetP).unwrap());

        let removed = cache.clear_all_models().unwrap();
        assert_eq!(removed, vec![ModelId::U2Net, ModelId::IsnetAnime]);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_require_model_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::with_dir(dir.path());
        let err = cache.require_model(ModelId::U2Net).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("u2net.onnx"));

        fs::write(cache.model_path(ModelId::U2Net), b"w").unwrap();
        assert_eq!(cache.require_model(ModelId::U2Net).unwrap(), cache.model_path(ModelId::U2Net));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::with_dir(dir.path().join("a").join("b"));
        cache.ensure_dir().unwrap();
        assert!(cache.cache_dir().is_dir());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(176 * 1024 * 1024), "176.0 MB");
    }
}
