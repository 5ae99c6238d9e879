//! Tract backend
//!
//! Pure Rust inference with no native runtime to install. Models are loaded
//! with a fixed input fact so Tract can optimize the whole graph for the one
//! input size each network expects.

use crate::cache::ModelCache;
use crate::config::MattingParams;
use crate::error::{BgRemovalError, Result};
use crate::inference::{prompted_model_error, remove_with_session, InferenceSession, RemovalBackend};
use crate::models::ModelId;
use instant::Instant;
use ndarray::{Array4, ArrayD, IxDyn};
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running background removal models using pure Rust inference
#[derive(Debug, Clone)]
pub struct TractBackend {
    cache: ModelCache,
}

/// An optimized runnable graph bound to one model
#[derive(Debug)]
pub struct TractSession {
    model: ModelId,
    runnable: TractModel,
}

impl TractBackend {
    #[must_use]
    pub fn new(cache: ModelCache) -> Self {
        Self { cache }
    }
}

impl RemovalBackend for TractBackend {
    type Session = TractSession;

    fn name(&self) -> &'static str {
        "tract"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn new_session(&mut self, model: ModelId) -> Result<TractSession> {
        if !model.supports_unprompted() {
            return Err(prompted_model_error(model));
        }

        let model_path = self.cache.require_model(model)?;
        let side = model.preprocessing_config().target_size as usize;
        let load_start = Instant::now();
        log::debug!("Loading {} into Tract with input 1x3x{}x{}", model, side, side);

        let runnable = tract_onnx::onnx()
            .model_for_path(&model_path)
            .map_err(|e| tract_error("load ONNX model", &e))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| tract_error("set input shape", &e))?
            .into_optimized()
            .map_err(|e| tract_error("optimize model", &e))?
            .into_runnable()
            .map_err(|e| tract_error("create runnable model", &e))?;

        log::info!(
            "Tract model {} ready in {}ms",
            model,
            load_start.elapsed().as_millis()
        );
        Ok(TractSession { model, runnable })
    }

    fn remove(
        &mut self,
        input: &[u8],
        session: &mut TractSession,
        matting: Option<&MattingParams>,
    ) -> Result<Vec<u8>> {
        remove_with_session(input, session, matting)
    }
}

impl InferenceSession for TractSession {
    fn model(&self) -> ModelId {
        self.model
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let inference_start = Instant::now();
        let shape = input.shape().to_vec();
        let data = input
            .as_slice()
            .ok_or_else(|| BgRemovalError::internal("Input tensor is not contiguous"))?;
        let tensor =
            Tensor::from_shape(&shape, data).map_err(|e| tract_error("build input tensor", &e))?;

        let outputs = self
            .runnable
            .run(tvec![tensor.into()])
            .map_err(|e| tract_error("run inference", &e))?;

        let first = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::processing("No output tensor found"))?
            .into_arc_tensor();
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| tract_error("read output tensor", &e))?;

        // Copy through plain buffers; tract may link a different ndarray release
        let output = ArrayD::from_shape_vec(IxDyn(view.shape()), view.iter().copied().collect())
            .map_err(|e| BgRemovalError::processing(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output shape {:?}",
            inference_start.elapsed().as_millis(),
            output.shape()
        );
        Ok(output)
    }
}

fn tract_error(action: &str, error: &TractError) -> BgRemovalError {
    BgRemovalError::processing(format!("Tract failed to {action}: {error}"))
}
