//! Services that keep file and progress concerns out of the processor

pub mod io;
pub mod progress;

pub use io::ImageIOService;
#[cfg(feature = "cli")]
pub use progress::{reporter_for_terminal, SpinnerProgressReporter};
pub use progress::{ConsoleProgressReporter, ProgressReporter, ProgressUpdate};
