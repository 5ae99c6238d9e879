//! Progress reporting service
//!
//! The processor only emits status text. Reporters turn that text, plus the
//! terminal outcome, into whatever the frontend shows. The outcome line
//! (`Saved: <file>` or `Error: <message>`) always goes to the reporter's
//! writer, so it survives redirected output.

use instant::Instant;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Status text with timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Status text exactly as emitted
    pub text: String,
    /// Elapsed time since the request started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(text: &str, start_time: Instant) -> Self {
        Self {
            text: text.to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Trait for reporting progress of a processing request
pub trait ProgressReporter: Send + Sync {
    /// Report a status line
    fn report_progress(&self, update: &ProgressUpdate);

    /// Report success with the written file
    fn report_completion(&self, output_path: &Path, elapsed_ms: u64);

    /// Report the failure message
    fn report_error(&self, message: &str);
}

/// Line-oriented reporter for non-interactive output
///
/// Writes one line per status update (when enabled) and one outcome line.
pub struct ConsoleProgressReporter<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
    show_status: bool,
}

impl ConsoleProgressReporter {
    /// Reporter writing to stdout
    #[must_use]
    pub fn stdout(show_status: bool) -> Self {
        Self::with_writer(std::io::stdout(), show_status)
    }
}

impl<W: Write + Send> ConsoleProgressReporter<W> {
    #[must_use]
    pub fn with_writer(writer: W, show_status: bool) -> Self {
        Self {
            out: Mutex::new(writer),
            show_status,
        }
    }

    /// Take the writer back, e.g. to inspect captured output
    pub fn into_writer(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_line(&self, line: &str) {
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // A closed pipe must not take the run down with it
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            log::debug!("Could not write progress line: {}", e);
        }
    }
}

impl<W: Write + Send> ProgressReporter for ConsoleProgressReporter<W> {
    fn report_progress(&self, update: &ProgressUpdate) {
        log::debug!("{} ({}ms elapsed)", update.text, update.elapsed_ms);
        if self.show_status {
            self.write_line(&update.text);
        }
    }

    fn report_completion(&self, output_path: &Path, elapsed_ms: u64) {
        log::info!("Saved {} after {}ms", output_path.display(), elapsed_ms);
        self.write_line(&format!("Saved: {}", display_name(output_path)));
    }

    fn report_error(&self, message: &str) {
        self.write_line(&format!("Error: {message}"));
    }
}

/// Terminal spinner for interactive use
///
/// Status text animates on stderr; the spinner is cleared when the request
/// ends and the outcome line is written as a plain line.
#[cfg(feature = "cli")]
pub struct SpinnerProgressReporter<W: Write + Send = std::io::Stdout> {
    bar: indicatif::ProgressBar,
    outcome: ConsoleProgressReporter<W>,
}

#[cfg(feature = "cli")]
impl SpinnerProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

#[cfg(feature = "cli")]
impl Default for SpinnerProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl<W: Write + Send> SpinnerProgressReporter<W> {
    /// Spinner whose outcome line goes to `writer`
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        let bar = indicatif::ProgressBar::new_spinner();
        let style = indicatif::ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Self {
            bar,
            outcome: ConsoleProgressReporter::with_writer(writer, false),
        }
    }

    pub fn into_writer(self) -> W {
        self.bar.finish_and_clear();
        self.outcome.into_writer()
    }
}

#[cfg(feature = "cli")]
impl<W: Write + Send> ProgressReporter for SpinnerProgressReporter<W> {
    fn report_progress(&self, update: &ProgressUpdate) {
        self.bar.set_message(update.text.clone());
        self.outcome.report_progress(update);
    }

    fn report_completion(&self, output_path: &Path, elapsed_ms: u64) {
        self.bar.finish_and_clear();
        self.outcome.report_completion(output_path, elapsed_ms);
    }

    fn report_error(&self, message: &str) {
        self.bar.finish_and_clear();
        self.outcome.report_error(message);
    }
}

/// Reporter suited to where stderr points: a spinner on a terminal, plain lines otherwise
#[cfg(feature = "cli")]
#[must_use]
pub fn reporter_for_terminal() -> Box<dyn ProgressReporter> {
    use std::io::IsTerminal;

    if std::io::stderr().is_terminal() {
        Box::new(SpinnerProgressReporter::new())
    } else {
        Box::new(ConsoleProgressReporter::stdout(true))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
