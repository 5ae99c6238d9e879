//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::models::ModelId;
use crate::utils::NumericValidator;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Valid range of the alpha-matting foreground threshold
pub const FG_THRESHOLD_RANGE: RangeInclusive<u8> = 200..=255;
/// Valid range of the alpha-matting background threshold
pub const BG_THRESHOLD_RANGE: RangeInclusive<u8> = 0..=50;
/// Valid range of the alpha-matting erosion size
pub const ERODE_SIZE_RANGE: RangeInclusive<u8> = 0..=40;

pub const DEFAULT_FG_THRESHOLD: u8 = 240;
pub const DEFAULT_BG_THRESHOLD: u8 = 10;
pub const DEFAULT_ERODE_SIZE: u8 = 10;

/// Suffix used when none (or an empty one) is given
pub const DEFAULT_SUFFIX: &str = "_nobg";

/// Suffixes offered by default; free text is accepted as well
pub const SUFFIX_OPTIONS: [&str; 5] = ["_nobg", "_alpha", "_masked", "_transparent", "_cutout"];

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Output image format options
///
/// Cutouts need an alpha channel, so PNG is the only format written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    Png,
}

impl OutputFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

/// Runtime settings handed to a backend when it is constructed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackendConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

/// Alpha-matting refinement parameters forwarded to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingParams {
    /// Mask values at or above this are definite foreground
    pub fg_threshold: u8,
    /// Mask values at or below this are definite background
    pub bg_threshold: u8,
    /// Side of the square structuring element used to erode both regions
    pub erode_size: u8,
}

impl Default for MattingParams {
    fn default() -> Self {
        Self {
            fg_threshold: DEFAULT_FG_THRESHOLD,
            bg_threshold: DEFAULT_BG_THRESHOLD,
            erode_size: DEFAULT_ERODE_SIZE,
        }
    }
}

/// Snapshot of the user's choices at the moment a request is made
///
/// The thresholds are only meaningful when alpha matting is enabled; use
/// [`ProcessingOptions::matting_params`] rather than reading them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    model_id: String,
    alpha_matting_enabled: bool,
    fg_threshold: u8,
    bg_threshold: u8,
    erode_size: u8,
    output_suffix: String,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            model_id: ModelId::default().as_str().to_string(),
            alpha_matting_enabled: false,
            fg_threshold: DEFAULT_FG_THRESHOLD,
            bg_threshold: DEFAULT_BG_THRESHOLD,
            erode_size: DEFAULT_ERODE_SIZE,
            output_suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl ProcessingOptions {
    /// Create a new options builder starting from the defaults
    ///
    /// # Examples
    /// ```rust
    /// use braindead_bgremove::ProcessingOptions;
    ///
    /// let options = ProcessingOptions::builder()
    ///     .model_id("u2net")
    ///     .alpha_matting(true)
    ///     .fg_threshold(250)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(options.matting_params().unwrap().fg_threshold, 250);
    /// ```
    #[must_use]
    pub fn builder() -> ProcessingOptionsBuilder {
        ProcessingOptionsBuilder::default()
    }

    /// Model identifier as given by the caller, not yet validated
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn alpha_matting_enabled(&self) -> bool {
        self.alpha_matting_enabled
    }

    #[must_use]
    pub fn output_suffix(&self) -> &str {
        &self.output_suffix
    }

    /// Matting parameters to forward, `None` when alpha matting is disabled
    #[must_use]
    pub fn matting_params(&self) -> Option<MattingParams> {
        self.alpha_matting_enabled.then_some(MattingParams {
            fg_threshold: self.fg_threshold,
            bg_threshold: self.bg_threshold,
            erode_size: self.erode_size,
        })
    }

    /// Resolve the model identifier against the supported set
    ///
    /// # Errors
    /// - `Configuration` when the identifier is not one of [`ModelId::ALL`]
    pub fn model(&self) -> Result<ModelId> {
        self.model_id.parse()
    }

    /// Validate every field
    ///
    /// Values produced by the builder are already in range; this catches
    /// snapshots that were deserialized or otherwise assembled by hand.
    ///
    /// # Errors
    /// - Unsupported model identifier
    /// - Matting values outside their documented ranges
    pub fn validate(&self) -> Result<ModelId> {
        let model = self.model()?;
        if self.alpha_matting_enabled {
            validate_in_range("fg_threshold", self.fg_threshold, &FG_THRESHOLD_RANGE)?;
            validate_in_range("bg_threshold", self.bg_threshold, &BG_THRESHOLD_RANGE)?;
            validate_in_range("erode_size", self.erode_size, &ERODE_SIZE_RANGE)?;
        }
        Ok(model)
    }
}

fn validate_in_range(name: &str, value: u8, range: &RangeInclusive<u8>) -> Result<u8> {
    NumericValidator::validate_range(value, *range.start(), *range.end(), name).map_err(|_| {
        BgRemovalError::config_value_error(
            name,
            value,
            &format!("{}-{}", range.start(), range.end()),
        )
    })
}

fn clamp_to(value: u8, range: &RangeInclusive<u8>) -> u8 {
    value.clamp(*range.start(), *range.end())
}

/// Builder for `ProcessingOptions`
///
/// Numeric values are clamped into their valid ranges, so a slider that
/// overshoots never turns into an error.
#[derive(Debug, Default)]
pub struct ProcessingOptionsBuilder {
    options: ProcessingOptions,
}

impl ProcessingOptionsBuilder {
    #[must_use]
    pub fn model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.options.model_id = model_id.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelId) -> Self {
        self.options.model_id = model.as_str().to_string();
        self
    }

    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.options.alpha_matting_enabled = enabled;
        self
    }

    #[must_use]
    pub fn fg_threshold(mut self, value: u8) -> Self {
        self.options.fg_threshold = clamp_to(value, &FG_THRESHOLD_RANGE);
        self
    }

    #[must_use]
    pub fn bg_threshold(mut self, value: u8) -> Self {
        self.options.bg_threshold = clamp_to(value, &BG_THRESHOLD_RANGE);
        self
    }

    #[must_use]
    pub fn erode_size(mut self, value: u8) -> Self {
        self.options.erode_size = clamp_to(value, &ERODE_SIZE_RANGE);
        self
    }

    /// Set the output suffix; an empty suffix falls back to [`DEFAULT_SUFFIX`]
    #[must_use]
    pub fn output_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        let suffix = suffix.into();
        self.options.output_suffix = if suffix.trim().is_empty() {
            DEFAULT_SUFFIX.to_string()
        } else {
            suffix
        };
        self
    }

    /// Build the options snapshot
    ///
    /// # Errors
    /// - Suffix containing a path separator, which would move the output
    ///   out of the input's directory
    pub fn build(self) -> Result<ProcessingOptions> {
        if self.options.output_suffix.contains(['/', '\\']) {
            return Err(BgRemovalError::configuration(format!(
                "Output suffix must not contain path separators: '{}'",
                self.options.output_suffix
            )));
        }
        Ok(self.options)
    }
}
