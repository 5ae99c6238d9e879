//! Inference backend abstraction
//!
//! A [`RemovalBackend`] is the only thing the processor knows about the model
//! runtime: it can open a session for a model and turn encoded image bytes into
//! encoded cutout bytes with that session. The ONNX Runtime and Tract backends
//! share the pixel pipeline in [`remove_with_session`] and differ only in how a
//! tensor is run.

use crate::{
    config::MattingParams,
    error::{BgRemovalError, Result},
    models::ModelId,
    utils::{AlphaMatting, ImagePreprocessor, MaskPostprocessor},
};
use ndarray::{Array4, ArrayD};
use tracing::{debug, span, Level};

/// Capability set of an inference runtime
///
/// Errors returned from either operation are surfaced to the caller as
/// [`BgRemovalError::Processing`] without further interpretation.
pub trait RemovalBackend: Send {
    /// Loaded model state, owned exclusively by one processor
    type Session: Send;

    /// Short backend name for logs and listings
    fn name(&self) -> &'static str;

    /// Whether the runtime behind this backend can be used in this environment
    fn is_available(&self) -> bool;

    /// Load a model and return a ready session
    ///
    /// # Errors
    /// - Model weights missing or unreadable
    /// - Runtime failed to build the session
    /// - Model cannot run without prompts
    fn new_session(&mut self, model: ModelId) -> Result<Self::Session>;

    /// Remove the background from an encoded image, returning encoded PNG bytes
    ///
    /// Matting is applied only when `matting` is `Some`.
    ///
    /// # Errors
    /// - Input bytes are not a decodable image
    /// - Inference failed or produced an unexpected output
    fn remove(
        &mut self,
        input: &[u8],
        session: &mut Self::Session,
        matting: Option<&MattingParams>,
    ) -> Result<Vec<u8>>;
}

/// A loaded model that maps an input tensor to its first output
pub trait InferenceSession {
    /// Model this session was built for
    fn model(&self) -> ModelId;

    /// Run the network on a `[1, 3, S, S]` tensor
    ///
    /// # Errors
    /// Runtime failures and unexpected output layouts
    fn infer(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>>;
}

/// Decode, segment and compose a cutout with any [`InferenceSession`]
///
/// # Errors
/// Decoding, inference, mask extraction and PNG encoding failures, all as
/// processing errors.
pub fn remove_with_session<S: InferenceSession + ?Sized>(
    input: &[u8],
    session: &mut S,
    matting: Option<&MattingParams>,
) -> Result<Vec<u8>> {
    let model = session.model();
    let image = image::load_from_memory(input)
        .map_err(|e| BgRemovalError::processing(format!("Failed to decode input image: {e}")))?;
    let (width, height) = (image.width(), image.height());

    let tensor = {
        let _span = span!(Level::DEBUG, "preprocessing", width, height).entered();
        ImagePreprocessor::preprocess_for_inference(&image, &model.preprocessing_config())?
    };

    let output = {
        let _span = span!(Level::INFO, "inference", model = %model).entered();
        session.infer(tensor)?
    };

    let _span = span!(Level::DEBUG, "postprocessing", matting = matting.is_some()).entered();
    let mask = MaskPostprocessor::extract_mask(&output.view(), model.family())?;
    let mut mask = MaskPostprocessor::resize_mask(&mask, width, height);
    if let Some(params) = matting {
        debug!(
            fg_threshold = params.fg_threshold,
            bg_threshold = params.bg_threshold,
            erode_size = params.erode_size,
            "Refining mask with alpha matting"
        );
        mask = AlphaMatting::refine(&mask, params);
    }

    let cutout = MaskPostprocessor::apply_mask(&image, &mask)?;
    MaskPostprocessor::encode_png(&cutout)
}

/// Error for models that need point or box prompts
pub(crate) fn prompted_model_error(model: ModelId) -> BgRemovalError {
    BgRemovalError::processing(format!(
        "Model '{model}' requires prompt input (points or boxes) and cannot remove backgrounds on its own"
    ))
}
