#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # braindead-bgremove
//!
//! Drop-an-image background removal. A [`BackgroundRemovalProcessor`] keeps one
//! model session warm and reuses it for every request with the same model;
//! switching models loads a new session, and [`Processor::clear_session`] forces
//! a reload. Results are written next to the input as RGBA PNGs.
//!
//! ## Features
//!
//! - **14 models**: the U2Net, ISNet, BiRefNet and cloth-segmentation families
//! - **Two backends**: ONNX Runtime (CUDA, `CoreML`, CPU) and Tract (pure Rust)
//! - **Alpha matting**: trimap refinement of mask edges
//! - **Model store**: weights downloaded on first use into `~/.u2net` or `U2NET_HOME`
//! - **Background worker**: one request at a time with status events
//! - **CLI**: optional command-line shell (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use braindead_bgremove::{
//!     BackendConfig, BackendFactory, BackendType, DefaultBackendFactory, ModelCache,
//!     ModelDownloader, ModelId, ProcessingOptions, Processor,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = ModelCache::new()?;
//! ModelDownloader::new(cache.clone())?
//!     .ensure_model(ModelId::U2Net, true, &mut |status| println!("{status}"))
//!     .await?;
//!
//! let mut processor = DefaultBackendFactory.create_processor(
//!     BackendType::Onnx,
//!     &BackendConfig::default(),
//!     cache,
//! )?;
//! let options = ProcessingOptions::builder().model(ModelId::U2Net).build()?;
//! let cutout = processor.process(
//!     "cat.jpg".as_ref(),
//!     "cat_nobg.png".as_ref(),
//!     &options,
//!     &mut |status| println!("{status}"),
//! )?;
//! println!("{}x{}", cutout.width(), cutout.height());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line shell and progress rendering
//! - `webp-support` (default): WebP input support
//! - `tracing-json`, `tracing-files`: extra log outputs for the shell

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
pub mod settings;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;
pub mod worker;

#[cfg(feature = "onnx")]
pub use backends::{OnnxBackend, OnnxSession};
#[cfg(feature = "tract")]
pub use backends::{TractBackend, TractSession};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{
    BackendConfig, ExecutionProvider, MattingParams, OutputFormat, ProcessingOptions,
    ProcessingOptionsBuilder,
};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, ErrorKind, Result};
pub use inference::{remove_with_session, InferenceSession, RemovalBackend};
pub use models::{ModelFamily, ModelId};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory, Processor,
};
pub use services::{ConsoleProgressReporter, ImageIOService, ProgressReporter, ProgressUpdate};
pub use settings::AppSettings;
pub use utils::{ExecutionProviderManager, NumericValidator, PathValidator, ProviderInfo};
pub use worker::{ProcessRequest, ProcessingWorker, WorkerError, WorkerEvent};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat, TracingOutput};
