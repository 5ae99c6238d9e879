//! Shared helpers for backends and the shell

pub mod matting;
pub mod postprocessing;
pub mod preprocessing;
pub mod providers;
pub mod validation;

pub use matting::AlphaMatting;
pub use postprocessing::MaskPostprocessor;
pub use preprocessing::ImagePreprocessor;
pub use providers::{ExecutionProviderManager, ProviderInfo};
pub use validation::{NumericValidator, PathValidator, SUPPORTED_INPUT_EXTENSIONS};
