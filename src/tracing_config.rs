//! Tracing configuration for the command-line frontend
//!
//! The library only emits `log` records and `tracing` spans; installing a
//! subscriber is left to the binary. `log` records reach the subscriber
//! through the `tracing-log` bridge that `tracing-subscriber` installs on init.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the console subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output with colors (default)
    Console,
    /// Plain output without colors, for CI logs
    Compact,
    /// JSON lines with span context
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where trace output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// stderr (default)
    Console,
    /// A log file, written from a background thread
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "compact" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            #[cfg(not(feature = "tracing-json"))]
            "json" => Err("JSON logs need the tracing-json feature".to_string()),
            other => Err(format!(
                "Unknown log format '{other}' (expected console, compact or json)"
            )),
        }
    }
}

impl TracingOutput {
    /// Output for an optional `--log-file` path
    ///
    /// # Errors
    /// - A path was given but file output is not compiled in
    pub fn from_log_file(path: Option<std::path::PathBuf>) -> Result<Self, String> {
        match path {
            None => Ok(Self::Console),
            #[cfg(feature = "tracing-files")]
            Some(path) => Ok(Self::File(path)),
            #[cfg(not(feature = "tracing-files"))]
            Some(path) => Err(format!(
                "Cannot log to {}: file logging needs the tracing-files feature",
                path.display()
            )),
        }
    }
}

/// Keeps buffered writers alive; dropping it flushes pending file output
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Environment filter string, overrides verbosity when set
    pub env_filter: Option<String>,
    /// Correlation id attached to the run
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// Quiet by default: the frontend prints its own status lines, so the log
    /// only shows warnings unless `-v` is given.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },
            (TracingFormat::Compact, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let appender = rolling::never(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("braindead-bgremove.log")),
                );
                let (writer, file_guard) = non_blocking(appender);
                guard._file_guard = Some(file_guard);

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                        registry.with(layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(layer).try_init()?;
                    },
                }
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Background removal session started");
        }
        Ok(guard)
    }
}

/// Install CLI defaults and return the session id tagging the run
///
/// # Errors
/// - See [`TracingConfig::init`]
#[cfg(feature = "cli")]
pub fn init_cli_tracing(
    verbosity: u8,
    format: TracingFormat,
    output: TracingOutput,
) -> anyhow::Result<(String, TracingGuard)> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_output(output)
        .with_session_id(session_id.clone());
    if let Ok(directives) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(directives);
    }
    let guard = config.init()?;
    Ok((session_id, guard))
}

/// Span helpers for the frontend's long-running steps
pub mod spans {
    use tracing::{Level, Span};

    /// Whole CLI run
    pub fn session(session_id: &str, backend: &str) -> Span {
        tracing::span!(Level::INFO, "session", session_id = %session_id, backend = %backend)
    }

    /// Fetching weights for one model
    pub fn download(model: &str) -> Span {
        tracing::span!(Level::INFO, "download", model = %model)
    }

    /// One input file handed to the worker
    pub fn file_processing(file_path: &std::path::Path) -> Span {
        tracing::span!(Level::INFO, "file_processing", file_path = %file_path.display())
    }
}
