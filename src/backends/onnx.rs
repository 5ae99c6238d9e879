//! ONNX Runtime backend
//!
//! Sessions are built from the weights in the model store with the configured
//! execution provider. A requested accelerator that is not available falls
//! back to CPU with a warning instead of failing the load.

use crate::cache::ModelCache;
use crate::config::{BackendConfig, ExecutionProvider, MattingParams};
use crate::error::{BgRemovalError, Result};
use crate::inference::{prompted_model_error, remove_with_session, InferenceSession, RemovalBackend};
use crate::models::ModelId;
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::time::Instant;

/// ONNX Runtime backend for running background removal models
#[derive(Debug, Clone)]
pub struct OnnxBackend {
    config: BackendConfig,
    cache: ModelCache,
}

/// A loaded ONNX Runtime session bound to one model
pub struct OnnxSession {
    model: ModelId,
    session: Session,
}

impl std::fmt::Debug for OnnxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSession").field("model", &self.model).finish_non_exhaustive()
    }
}

impl OnnxBackend {
    #[must_use]
    pub fn new(config: BackendConfig, cache: ModelCache) -> Self {
        Self { config, cache }
    }

    /// Whether ONNX Runtime reports the provider as usable on this machine
    #[must_use]
    pub fn is_provider_available(provider: ExecutionProvider) -> bool {
        match provider {
            ExecutionProvider::Cpu | ExecutionProvider::Auto => true,
            ExecutionProvider::Cuda => {
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
            },
            ExecutionProvider::CoreMl => {
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false)
            },
        }
    }

    /// Accelerators to register, most preferred first; empty means CPU only
    fn execution_providers(&self) -> Vec<ExecutionProviderDispatch> {
        let cuda = || CUDAExecutionProvider::default().build();
        let coreml = || CoreMLExecutionProvider::default().with_subgraphs(true).build();

        match self.config.execution_provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if Self::is_provider_available(ExecutionProvider::Cuda) {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda());
                }
                if Self::is_provider_available(ExecutionProvider::CoreMl) {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            requested @ (ExecutionProvider::Cuda | ExecutionProvider::CoreMl) => {
                if Self::is_provider_available(requested) {
                    log::info!("Using {} execution provider", requested);
                    vec![if requested == ExecutionProvider::Cuda { cuda() } else { coreml() }]
                } else {
                    log::warn!(
                        "{} execution provider requested but not available, falling back to CPU",
                        requested
                    );
                    Vec::new()
                }
            },
        }
    }

    /// Thread counts to use, resolving 0 to values derived from the core count
    fn thread_counts(&self) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);
        let intra = if self.config.intra_threads > 0 {
            self.config.intra_threads
        } else {
            cores
        };
        let inter = if self.config.inter_threads > 0 {
            self.config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }

    fn session_builder(&self) -> Result<SessionBuilder> {
        let (intra_threads, inter_threads) = self.thread_counts();
        let providers = self.execution_providers();

        let mut builder = Session::builder()
            .map_err(|e| ort_error("create session builder", &e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ort_error("set optimization level", &e))?;

        if !providers.is_empty() {
            builder = builder
                .with_execution_providers(providers)
                .map_err(|e| ort_error("register execution providers", &e))?;
        }

        log::debug!("Threading: {intra_threads} intra-op, {inter_threads} inter-op");
        builder
            .with_parallel_execution(true)
            .map_err(|e| ort_error("enable parallel execution", &e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| ort_error("set intra threads", &e))?
            .with_inter_threads(inter_threads)
            .map_err(|e| ort_error("set inter threads", &e))
    }
}

impl RemovalBackend for OnnxBackend {
    type Session = OnnxSession;

    fn name(&self) -> &'static str {
        "onnx"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn new_session(&mut self, model: ModelId) -> Result<OnnxSession> {
        if !model.supports_unprompted() {
            return Err(prompted_model_error(model));
        }

        let model_path = self.cache.require_model(model)?;
        let load_start = Instant::now();
        let session = self
            .session_builder()?
            .commit_from_file(&model_path)
            .map_err(|e| ort_error("create session from model file", &e))?;

        log::info!(
            "ONNX Runtime session for {} ready in {:.0}ms ({} provider)",
            model,
            load_start.elapsed().as_secs_f64() * 1000.0,
            self.config.execution_provider
        );
        Ok(OnnxSession { model, session })
    }

    fn remove(
        &mut self,
        input: &[u8],
        session: &mut OnnxSession,
        matting: Option<&MattingParams>,
    ) -> Result<Vec<u8>> {
        remove_with_session(input, session, matting)
    }
}

impl InferenceSession for OnnxSession {
    fn model(&self) -> ModelId {
        self.model
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value =
            Value::from_array(input).map_err(|e| ort_error("convert input tensor", &e))?;

        // Positional access, the input and output names differ between exports
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| ort_error("run inference", &e))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgRemovalError::processing("No output tensors found"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::processing("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| ort_error("extract output tensor", &e))?
            .to_owned();

        log::debug!(
            "Inference complete in {:.2}ms, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );
        Ok(output)
    }
}

fn ort_error(action: &str, error: &ort::Error) -> BgRemovalError {
    BgRemovalError::processing(format!("ONNX Runtime failed to {action}: {error}"))
}
