//! Model weight downloads
//!
//! Weights are fetched from their release URL into a temporary file inside the
//! model store and renamed into place only once the transfer has finished, so
//! an interrupted download never looks like a usable model.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use crate::models::ModelId;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Status text emitted while a model is being fetched
#[must_use]
pub fn downloading_model_status(model: ModelId) -> String {
    format!("Downloading model: {}...", model)
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    fn bar() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            pb.set_style(style);
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }

    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Fetches missing weights into a [`ModelCache`]
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(1800)) // large BiRefNet weights
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Make sure the weights for `model` are in the store, downloading if needed
    ///
    /// `status` receives the download notice only when a transfer actually starts.
    ///
    /// # Errors
    /// - `Configuration` for models without downloadable weights
    /// - `Network` when the transfer fails
    /// - `Io` when the store cannot be written
    pub async fn ensure_model(
        &self,
        model: ModelId,
        show_progress: bool,
        status: &mut (dyn FnMut(&str) + Send),
    ) -> Result<PathBuf> {
        if self.cache.is_model_cached(model) {
            log::debug!("Model {} already present in {}", model, self.cache.cache_dir().display());
            return Ok(self.cache.model_path(model));
        }
        status(&downloading_model_status(model));
        self.download_model(model, show_progress).await
    }

    /// Download the weights for `model`, replacing any existing file
    ///
    /// # Errors
    /// - `Configuration` for models without downloadable weights
    /// - `Network` when the transfer fails
    /// - `Io` when the store cannot be written
    pub async fn download_model(&self, model: ModelId, show_progress: bool) -> Result<PathBuf> {
        let url = model.download_url().ok_or_else(|| {
            BgRemovalError::configuration(format!(
                "Model {model} has no downloadable weights; it requires prompt input"
            ))
        })?;

        self.cache.ensure_dir()?;
        let final_path = self.cache.model_path(model);
        log::info!("Downloading model {} from {}", model, url);

        let progress = if show_progress {
            ProgressIndicator::bar()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(model.to_string());

        match self.download_to(&url, &final_path, &progress).await {
            Ok(bytes) => {
                progress.finish_with_message(format!("Downloaded {model}"));
                log::info!("Stored {} ({} bytes) at {}", model, bytes, final_path.display());
                Ok(final_path)
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    /// Stream `url` into `destination` via a temporary sibling file
    async fn download_to(
        &self,
        url: &str,
        destination: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| BgRemovalError::file_io_error("create temporary download file", dir, &e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {}", response.status()),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let std_file = temp
            .as_file()
            .try_clone()
            .map_err(|e| BgRemovalError::file_io_error("open temporary download file", temp.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);
        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;
            if read == 0 {
                break;
            }
            file.write_all(buffer.get(..read).unwrap_or(&[]))
                .await
                .map_err(|e| BgRemovalError::file_io_error("write download", temp.path(), &e))?;
            downloaded += read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush download", temp.path(), &e))?;
        drop(file);

        if downloaded == 0 {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                "empty response body",
            ));
        }

        temp.persist(destination)
            .map_err(|e| BgRemovalError::file_io_error("move download into place", destination, &e.error))?;
        Ok(downloaded)
    }
}
