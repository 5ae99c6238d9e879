//! Processing coordinator
//!
//! [`BackgroundRemovalProcessor`] turns one `(input, output, options)` request
//! into a written PNG. It keeps a single inference session bound to the model
//! that was used last and only asks the backend for a new one when the
//! requested model changes. Model loads dominate latency, so this is what makes
//! repeated requests cheap.
//!
//! The processor is not reentrant. Callers serialize requests against one
//! instance (see [`crate::worker::ProcessingWorker`]).

use crate::{
    cache::ModelCache,
    config::{BackendConfig, ProcessingOptions},
    error::{BgRemovalError, Result},
    inference::RemovalBackend,
    models::ModelId,
    services::ImageIOService,
};
use image::RgbaImage;
use instant::Instant;
use log::{debug, info};
use std::fmt;
use std::path::Path;
use tracing::instrument;

/// Status line emitted before the backend transform runs
pub const REMOVING_BACKGROUND_STATUS: &str = "Removing background...";

/// Status line emitted before a model session is created
#[must_use]
pub fn loading_model_status(model: ModelId) -> String {
    format!("Loading model: {model}...")
}

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Onnx => "onnx",
            Self::Tract => "tract",
        })
    }
}

/// Uniform processing contract, independent of the backend behind it
///
/// Variants are selected by configuration through a [`BackendFactory`].
pub trait Processor: Send {
    /// Remove the background from `input_path` and write the cutout to `output_path`
    ///
    /// `status` receives, in order, an optional `"Loading model: <id>..."` line
    /// and then `"Removing background..."`. On success exactly one file is
    /// written; on failure none is.
    ///
    /// # Errors
    /// - [`BgRemovalError::Configuration`] for an unknown model id or invalid options,
    ///   before any backend call
    /// - [`BgRemovalError::Io`] when the input cannot be read or the output cannot be written
    /// - [`BgRemovalError::Processing`] when the backend fails or returns undecodable bytes
    fn process(
        &mut self,
        input_path: &Path,
        output_path: &Path,
        options: &ProcessingOptions,
        status: &mut dyn FnMut(&str),
    ) -> Result<RgbaImage>;

    /// Whether this processor's backend can run here
    fn is_available(&self) -> bool;

    /// Backend name
    fn name(&self) -> &'static str;

    /// Drop the cached session; the next request reloads its model
    fn clear_session(&mut self);

    /// Model the cached session is bound to
    fn current_model(&self) -> Option<ModelId>;
}

/// Coordinator with a single-slot session cache over a [`RemovalBackend`]
pub struct BackgroundRemovalProcessor<B: RemovalBackend> {
    backend: B,
    session: Option<(ModelId, B::Session)>,
}

impl<B: RemovalBackend> BackgroundRemovalProcessor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: None,
        }
    }

    /// Backend this processor delegates to
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bind the cached session to `model`, loading a new one if it is bound elsewhere
    ///
    /// The old session is dropped only after the new one loaded, so a failed
    /// load leaves the previous binding intact.
    fn ensure_session(&mut self, model: ModelId, status: &mut dyn FnMut(&str)) -> Result<()> {
        let reusable = matches!(&self.session, Some((bound, _)) if *bound == model);
        if reusable {
            debug!("Reusing cached {} session for {}", self.backend.name(), model);
        } else {
            status(&loading_model_status(model));
            let load_start = Instant::now();
            let session = self.backend.new_session(model).map_err(backend_failure)?;
            info!(
                "Loaded {} on {} in {}ms",
                model,
                self.backend.name(),
                load_start.elapsed().as_millis()
            );
            self.session = Some((model, session));
        }
        Ok(())
    }
}

impl<B: RemovalBackend> Processor for BackgroundRemovalProcessor<B> {
    #[instrument(
        skip(self, options, status),
        fields(
            backend = self.backend.name(),
            model = %options.model_id(),
            input = %input_path.display()
        )
    )]
    fn process(
        &mut self,
        input_path: &Path,
        output_path: &Path,
        options: &ProcessingOptions,
        status: &mut dyn FnMut(&str),
    ) -> Result<RgbaImage> {
        let model = options.validate()?;
        let total_start = Instant::now();

        self.ensure_session(model, status)?;

        let input = ImageIOService::read_input(input_path)?;

        status(REMOVING_BACKGROUND_STATUS);
        let matting = options.matting_params();
        let Some((_, session)) = self.session.as_mut() else {
            return Err(BgRemovalError::internal("Session missing before transform"));
        };
        let output = self
            .backend
            .remove(&input, session, matting.as_ref())
            .map_err(backend_failure)?;

        let image = ImageIOService::decode_rgba(&output)?;
        ImageIOService::save_png(&image, output_path)?;

        info!(
            "Removed background from {} ({}x{}) in {}ms",
            input_path.display(),
            image.width(),
            image.height(),
            total_start.elapsed().as_millis()
        );
        Ok(image)
    }

    fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn clear_session(&mut self) {
        if let Some((model, _)) = self.session.take() {
            debug!("Dropped cached session for {}", model);
        }
    }

    fn current_model(&self) -> Option<ModelId> {
        self.session.as_ref().map(|(model, _)| *model)
    }
}

/// Backend errors surface as processing errors carrying the original message
fn backend_failure(error: BgRemovalError) -> BgRemovalError {
    match error {
        BgRemovalError::Processing(_) => error,
        other => BgRemovalError::Processing(other.to_string()),
    }
}

/// Factory trait for creating processors by backend type
pub trait BackendFactory: Send + Sync {
    /// Build a processor around a backend of the given type
    ///
    /// # Errors
    /// Returns `BgRemovalError` for:
    /// - Backend types compiled out of this build
    /// - Invalid backend configuration
    fn create_processor(
        &self,
        backend_type: BackendType,
        config: &BackendConfig,
        cache: ModelCache,
    ) -> Result<Box<dyn Processor>>;

    /// List backend types this factory can build
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled by cargo features
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_processor(
        &self,
        backend_type: BackendType,
        config: &BackendConfig,
        cache: ModelCache,
    ) -> Result<Box<dyn Processor>> {
        crate::utils::NumericValidator::validate_thread_count(config.intra_threads)?;
        crate::utils::NumericValidator::validate_thread_count(config.inter_threads)?;

        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(BackgroundRemovalProcessor::new(
                crate::backends::OnnxBackend::new(config.clone(), cache),
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(BackgroundRemovalProcessor::new(
                crate::backends::TractBackend::new(cache),
            ))),
            #[allow(unreachable_patterns)]
            other => {
                let _ = (config, cache);
                Err(BgRemovalError::configuration(format!(
                    "Backend '{other}' is not available in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}
