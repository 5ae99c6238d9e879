//! Background removal command-line shell
//!
//! Stands in for the drop window: every input path is treated like a dropped
//! file. Settings come from the settings file, flags override them, and each
//! file is handed to the worker one at a time.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache, MODEL_HOME_ENV},
    download::ModelDownloader,
    models::ModelId,
    processor::{BackendFactory, BackendType, DefaultBackendFactory},
    services::{reporter_for_terminal, ImageIOService, ProgressReporter, ProgressUpdate},
    settings::AppSettings,
    tracing_config::{init_cli_tracing, spans, TracingFormat, TracingOutput},
    utils::{ExecutionProviderManager, PathValidator},
    worker::{ProcessRequest, ProcessingWorker, WorkerEvent},
};
use anyhow::{Context, Result};
use clap::Parser;
use instant::Instant;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::Instrument;

/// Remove image backgrounds with a cached segmentation model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "braindead-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Image files to process, in order
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = &["list_models", "download_only", "clear_cache", "show_cache_dir", "show_providers", "save_config"]
    )]
    pub inputs: Vec<PathBuf>,

    /// Model id [default: from settings, initially birefnet-general]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Suffix appended to the output file stem (e.g. _nobg, _alpha, _cutout)
    #[arg(short, long)]
    pub suffix: Option<String>,

    /// Refine mask edges with alpha matting
    #[arg(long, conflicts_with = "no_alpha_matting")]
    pub alpha_matting: bool,

    /// Disable alpha matting even if the settings enable it
    #[arg(long)]
    pub no_alpha_matting: bool,

    /// Alpha matting foreground threshold (200-255)
    #[arg(long, allow_negative_numbers = true)]
    pub fg_threshold: Option<i64>,

    /// Alpha matting background threshold (0-50)
    #[arg(long, allow_negative_numbers = true)]
    pub bg_threshold: Option<i64>,

    /// Alpha matting erode size (0-40)
    #[arg(long, allow_negative_numbers = true)]
    pub erode_size: Option<i64>,

    /// Backend in format backend[:provider] (e.g. onnx, onnx:cuda, onnx:coreml, tract)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Number of inference threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Settings file [default: bg_remover_config.json next to the executable]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save_config: bool,

    /// Process inputs even when auto_process is disabled in the settings
    #[arg(long)]
    pub process: bool,

    /// Reload the model for every file instead of reusing the loaded session
    #[arg(long)]
    pub reload: bool,

    /// List available models and which ones are downloaded, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Download the selected model without processing any images
    #[arg(long)]
    pub download_only: bool,

    /// Remove downloaded models (only the one given with --model, if present)
    #[arg(long)]
    pub clear_cache: bool,

    /// Print the model directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Show backend and execution provider availability, then exit
    #[arg(long)]
    pub show_providers: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format: console, compact or json (json needs the tracing-json feature)
    #[arg(long, value_name = "FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Write logs to this file instead of stderr (needs the tracing-files feature)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_output = TracingOutput::from_log_file(cli.log_file.clone()).map_err(anyhow::Error::msg)?;
    let (session_id, _tracing_guard) = init_cli_tracing(cli.verbose, cli.log_format, log_output)
        .context("Failed to initialize tracing")?;

    let settings_path = cli.config.clone().unwrap_or_else(AppSettings::default_path);
    let mut settings = AppSettings::load_from(&settings_path);
    CliConfigBuilder::apply_overrides(&cli, &mut settings)?;

    let span = spans::session(&session_id, &settings.backend);
    let outcome = run(&cli, &settings).instrument(span).await;

    if cli.save_config {
        settings
            .save_to(&settings_path)
            .with_context(|| format!("Failed to save settings to {}", settings_path.display()))?;
        println!("Settings saved to {}", settings_path.display());
    }

    outcome
}

async fn run(cli: &Cli, settings: &AppSettings) -> Result<()> {
    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let cache = ModelCache::new().context("Failed to open model directory")?;

    if cli.show_cache_dir {
        show_cache_dir(&cache);
        return Ok(());
    }
    if cli.list_models {
        return list_models(&cache);
    }
    if cli.clear_cache {
        return clear_cache(cli, &cache);
    }
    if cli.download_only {
        let model = CliConfigBuilder::model(cli, settings)?;
        let downloader = ModelDownloader::new(cache).context("Failed to create model downloader")?;
        return ensure_model(&downloader, model).await.map(|_| ());
    }
    if cli.inputs.is_empty() {
        return Ok(());
    }

    process_inputs(cli, settings, cache).await
}

fn show_provider_diagnostics() {
    println!("Backends and execution providers");
    println!();
    let factory = DefaultBackendFactory;
    let built: Vec<String> = factory
        .available_backends()
        .iter()
        .map(BackendType::to_string)
        .collect();
    println!("Compiled backends: {}", built.join(", "));
    println!();

    for info in ExecutionProviderManager::list_all_providers() {
        let status = if info.available { "available" } else { "not available" };
        println!("  {:<12} {:<14} {}", info.name, status, info.description);
    }
    println!();
    println!("Select with --backend, e.g. --backend onnx:cuda or --backend tract");
}

fn show_cache_dir(cache: &ModelCache) {
    println!("{}", cache.cache_dir().display());
    if std::env::var_os(MODEL_HOME_ENV).is_some() {
        log::info!("Model directory taken from {}", MODEL_HOME_ENV);
    }
}

fn list_models(cache: &ModelCache) -> Result<()> {
    let cached = cache.scan_cached_models().context("Failed to scan model directory")?;

    println!("Models (directory: {})", cache.cache_dir().display());
    println!();
    for model in ModelId::ALL {
        let marker = match cached.iter().find(|info| info.model == model) {
            Some(info) => format!("[downloaded, {}]", format_size(info.size_bytes)),
            None if !model.supports_unprompted() => "[needs prompts]".to_string(),
            None => String::new(),
        };
        let default = if model == ModelId::default() { " (default)" } else { "" };
        println!("  {:<24} {}{} {}", model.as_str(), model.description(), default, marker);
    }
    Ok(())
}

fn clear_cache(cli: &Cli, cache: &ModelCache) -> Result<()> {
    if let Some(name) = &cli.model {
        let model: ModelId = name.parse()?;
        if cache.clear_specific_model(model).context("Failed to remove model")? {
            println!("Removed model: {model}");
        } else {
            println!("Model {model} is not downloaded");
        }
        return Ok(());
    }

    let removed = cache.clear_all_models().context("Failed to clear model directory")?;
    if removed.is_empty() {
        println!("No downloaded models to remove");
    } else {
        for model in &removed {
            println!("Removed model: {model}");
        }
    }
    Ok(())
}

async fn ensure_model(downloader: &ModelDownloader, model: ModelId) -> Result<PathBuf> {
    downloader
        .ensure_model(model, true, &mut |status| println!("{status}"))
        .instrument(spans::download(model.as_str()))
        .await
        .with_context(|| format!("Failed to download model {model}"))
}

async fn process_inputs(cli: &Cli, settings: &AppSettings, cache: ModelCache) -> Result<()> {
    // Unknown model ids and bad suffixes fail here, before anything is loaded
    let options = settings.to_options().context("Invalid settings")?;
    let model = options.validate()?;
    let (backend_type, backend_config) = CliConfigBuilder::backend_config(cli, settings)?;

    let processor = DefaultBackendFactory
        .create_processor(backend_type, &backend_config, cache.clone())
        .context("Failed to create processor")?;
    let downloader = ModelDownloader::new(cache).context("Failed to create model downloader")?;
    let (worker, mut events) = ProcessingWorker::new(processor);
    log::info!("Using {} backend with model {}", worker.name(), model);

    let mut failures = 0usize;
    for input in &cli.inputs {
        let loaded = match load_dropped_file(input) {
            Ok(loaded) => loaded,
            Err(e) => {
                println!("Error: {e}");
                failures += 1;
                continue;
            },
        };
        println!("{loaded}");

        if !settings.auto_process && !cli.process {
            println!("Auto-process is off; pass --process to remove the background");
            continue;
        }

        ensure_model(&downloader, model).await?;
        let request = ProcessRequest {
            input_path: input.clone(),
            output_path: ImageIOService::output_path_for(input, options.output_suffix(), settings.output_format),
            options: options.clone(),
        };
        let reporter = reporter_for_terminal();
        let succeeded = process_file(&worker, &mut events, reporter.as_ref(), request, cli.reload)
            .instrument(spans::file_processing(input))
            .await?;
        if !succeeded {
            failures += 1;
        }
    }

    match failure_summary(failures, cli.inputs.len()) {
        Some(summary) => anyhow::bail!(summary),
        None => Ok(()),
    }
}

/// Closing line for a run with failures, counted against every input given
fn failure_summary(failures: usize, inputs: usize) -> Option<String> {
    (failures > 0).then(|| format!("{failures} of {inputs} file(s) failed"))
}

/// Validate a path the way the drop target does and describe what was loaded
fn load_dropped_file(input: &Path) -> crate::error::Result<String> {
    PathValidator::validate_input_image(input)?;
    let image = ImageIOService::load_image(input)?;
    let name = input
        .file_name()
        .map_or_else(|| input.display().to_string(), |n| n.to_string_lossy().into_owned());
    Ok(format!("Loaded: {} ({}x{})", name, image.width(), image.height()))
}

/// Run one file through the worker; `Ok(false)` means the request failed
///
/// With `reload` the worker drops its session first, so the model is loaded
/// again for this file.
async fn process_file(
    worker: &ProcessingWorker,
    events: &mut UnboundedReceiver<WorkerEvent>,
    reporter: &dyn ProgressReporter,
    request: ProcessRequest,
    reload: bool,
) -> Result<bool> {
    if reload {
        worker.clear_session()?;
    }
    let input = request.input_path.clone();
    let start = Instant::now();
    let request_id = worker.submit(request)?;

    while let Some(event) = events.recv().await {
        if event.request_id() != request_id {
            continue;
        }
        match event {
            WorkerEvent::Status { text, .. } => {
                reporter.report_progress(&ProgressUpdate::new(&text, start));
            },
            WorkerEvent::Completed { output_path, .. } => {
                reporter.report_completion(&output_path, start.elapsed().as_millis() as u64);
                return Ok(true);
            },
            WorkerEvent::Failed { message, .. } => {
                reporter.report_error(&message);
                return Ok(false);
            },
        }
    }
    anyhow::bail!("Worker stopped before finishing {}", input.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;
    use crate::config::ProcessingOptions;
    use crate::processor::BackgroundRemovalProcessor;
    use crate::services::ConsoleProgressReporter;
    use tempfile::TempDir;

    fn mock_worker() -> (ProcessingWorker, UnboundedReceiver<WorkerEvent>) {
        ProcessingWorker::new(Box::new(BackgroundRemovalProcessor::new(MockBackend::new())))
    }

    fn request_for(dir: &TempDir, name: &str) -> ProcessRequest {
        let input = dir.path().join(name);
        if !input.exists() {
            image::RgbImage::new(6, 4).save(&input).unwrap();
        }
        let options = ProcessingOptions::builder().model(ModelId::U2NetP).build().unwrap();
        ProcessRequest {
            output_path: ImageIOService::output_path_for(&input, options.output_suffix(), crate::config::OutputFormat::Png),
            input_path: input,
            options,
        }
    }

    async fn run_files(names: &[&str], reload: bool) -> Vec<String> {
        let dir = TempDir::new().unwrap();
        let (worker, mut events) = mock_worker();
        let reporter = ConsoleProgressReporter::with_writer(Vec::new(), true);
        for name in names {
            process_file(&worker, &mut events, &reporter, request_for(&dir, name), reload)
                .await
                .unwrap();
        }
        String::from_utf8(reporter.into_writer())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_files_share_session_without_reload() {
        let lines = run_files(&["a.png", "b.png"], false).await;
        assert_eq!(
            lines,
            vec![
                "Loading model: u2netp...",
                "Removing background...",
                "Saved: a_nobg.png",
                "Removing background...",
                "Saved: b_nobg.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_reload_loads_model_for_every_file() {
        let lines = run_files(&["a.png", "b.png"], true).await;
        assert_eq!(
            lines,
            vec![
                "Loading model: u2netp...",
                "Removing background...",
                "Saved: a_nobg.png",
                "Loading model: u2netp...",
                "Removing background...",
                "Saved: b_nobg.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_file_reports_error_line() {
        let dir = TempDir::new().unwrap();
        let (worker, mut events) = mock_worker();
        let reporter = ConsoleProgressReporter::with_writer(Vec::new(), false);
        let mut request = request_for(&dir, "a.png");
        request.input_path = dir.path().join("vanished.png");

        let succeeded = process_file(&worker, &mut events, &reporter, request, false)
            .await
            .unwrap();
        assert!(!succeeded);
        let output = String::from_utf8(reporter.into_writer()).unwrap();
        assert!(output.starts_with("Error: "), "{output}");
    }

    #[test]
    fn test_failure_summary_counts_all_inputs() {
        assert_eq!(failure_summary(0, 3), None);
        // A file skipped at load time still counts as one of the inputs
        assert_eq!(failure_summary(1, 3).as_deref(), Some("1 of 3 file(s) failed"));
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::try_parse_from(["braindead-bgremove", "a.png"]).unwrap();
        assert_eq!(cli.log_format, TracingFormat::Console);
        assert!(cli.log_file.is_none());

        let cli = Cli::try_parse_from(["braindead-bgremove", "--log-format", "compact", "--log-file", "run.log", "a.png"]).unwrap();
        assert_eq!(cli.log_format, TracingFormat::Compact);
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));

        assert!(Cli::try_parse_from(["braindead-bgremove", "--log-format", "xml", "a.png"]).is_err());
    }

    #[test]
    fn test_management_flags_need_no_inputs() {
        for flag in ["--list-models", "--download-only", "--clear-cache", "--show-cache-dir", "--show-providers"] {
            let cli = Cli::try_parse_from(["braindead-bgremove", flag]).unwrap();
            assert!(cli.inputs.is_empty());
        }
        assert!(Cli::try_parse_from(["braindead-bgremove"]).is_err());
    }

    #[test]
    fn test_inputs_keep_order() {
        let cli = Cli::try_parse_from(["braindead-bgremove", "b.png", "a.jpg", "-vv"]).unwrap();
        assert_eq!(cli.inputs, vec![PathBuf::from("b.png"), PathBuf::from("a.jpg")]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.process);
    }

    #[test]
    fn test_matting_flags_conflict() {
        assert!(Cli::try_parse_from(["braindead-bgremove", "--alpha-matting", "--no-alpha-matting", "a.png"]).is_err());
    }

    #[test]
    fn test_load_dropped_file_reports_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cat.png");
        image::RgbImage::new(12, 7).save(&path).unwrap();
        assert_eq!(load_dropped_file(&path).unwrap(), "Loaded: cat.png (12x7)");
    }

    #[test]
    fn test_load_dropped_file_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let missing = load_dropped_file(&dir.path().join("gone.png")).unwrap_err();
        assert!(missing.to_string().contains("File not found"));

        let text = dir.path().join("notes.xyz");
        std::fs::write(&text, b"hello").unwrap();
        let unsupported = load_dropped_file(&text).unwrap_err();
        assert!(unsupported.to_string().contains("Unsupported format .xyz"));
    }
}
