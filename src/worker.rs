//! One-at-a-time background execution
//!
//! The processor blocks for seconds at a time, so frontends hand requests to a
//! [`ProcessingWorker`], which runs them on tokio's blocking pool and streams
//! status and outcome back as [`WorkerEvent`]s. Only one request may be in
//! flight; a second submission is rejected rather than queued.
//!
//! There is no cancellation. A backend call that never returns keeps the
//! worker busy for good.

use crate::{
    config::ProcessingOptions,
    error::ErrorKind,
    models::ModelId,
    processor::Processor,
};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info_span;

/// A single processing request
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub options: ProcessingOptions,
}

/// Events delivered to the frontend, tagged with the request they belong to
///
/// Per request: zero or more `Status`, then exactly one `Completed` or `Failed`.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Status {
        request_id: u64,
        text: String,
    },
    Completed {
        request_id: u64,
        output_path: PathBuf,
        image: RgbaImage,
    },
    Failed {
        request_id: u64,
        kind: ErrorKind,
        message: String,
    },
}

impl WorkerEvent {
    #[must_use]
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Status { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }

    /// Whether this event ends its request
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Status { .. })
    }
}

/// Reasons a submission is refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    #[error("A request is already being processed")]
    Busy,
    #[error("No async runtime is available to run the request")]
    NoRuntime,
}

/// Owns a processor and runs its requests off the caller's thread
pub struct ProcessingWorker {
    processor: Arc<Mutex<Box<dyn Processor>>>,
    in_flight: Arc<AtomicBool>,
    next_request_id: AtomicU64,
    events: UnboundedSender<WorkerEvent>,
    name: &'static str,
    available: bool,
}

/// Clears the in-flight flag when dropped, including on unwind
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ProcessingWorker {
    /// Wrap a processor; the receiver yields every event the worker produces
    #[must_use]
    pub fn new(processor: Box<dyn Processor>) -> (Self, UnboundedReceiver<WorkerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let worker = Self {
            name: processor.name(),
            available: processor.is_available(),
            processor: Arc::new(Mutex::new(processor)),
            in_flight: Arc::new(AtomicBool::new(false)),
            next_request_id: AtomicU64::new(1),
            events,
        };
        (worker, receiver)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Whether a request is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a request, returning its id
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - [`WorkerError::Busy`] while another request is in flight
    /// - [`WorkerError::NoRuntime`] outside a tokio runtime
    pub fn submit(&self, request: ProcessRequest) -> Result<u64, WorkerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        let guard = self.claim()?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let processor = Arc::clone(&self.processor);
        let events = self.events.clone();
        handle.spawn_blocking(move || run_request(&processor, &events, request_id, request, guard));
        Ok(request_id)
    }

    /// Drop the processor's cached session
    ///
    /// # Errors
    /// - [`WorkerError::Busy`] while a request is in flight
    pub fn clear_session(&self) -> Result<(), WorkerError> {
        let _guard = self.claim()?;
        lock(&self.processor).clear_session();
        Ok(())
    }

    /// Model the processor's session is bound to, `None` while busy or unbound
    #[must_use]
    pub fn current_model(&self) -> Option<ModelId> {
        if self.is_busy() {
            return None;
        }
        // Never claims the slot, so a concurrent submit is not turned away
        match self.processor.try_lock() {
            Ok(processor) => processor.current_model(),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner().current_model(),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    fn claim(&self) -> Result<InFlightGuard, WorkerError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlightGuard(Arc::clone(&self.in_flight)))
            .map_err(|_| WorkerError::Busy)
    }
}

fn lock(processor: &Mutex<Box<dyn Processor>>) -> MutexGuard<'_, Box<dyn Processor>> {
    // A panic mid-request leaves the processor in a usable state; the session is
    // either the old one or the new one.
    processor
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn run_request(
    processor: &Mutex<Box<dyn Processor>>,
    events: &UnboundedSender<WorkerEvent>,
    request_id: u64,
    request: ProcessRequest,
    guard: InFlightGuard,
) {
    let _span = info_span!("request", request_id, input = %request.input_path.display()).entered();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut status = |text: &str| {
            // A dropped receiver only means nobody is listening any more
            let _ = events.send(WorkerEvent::Status {
                request_id,
                text: text.to_string(),
            });
        };
        lock(processor).process(
            &request.input_path,
            &request.output_path,
            &request.options,
            &mut status,
        )
    }));

    let event = match outcome {
        Ok(Ok(image)) => WorkerEvent::Completed {
            request_id,
            output_path: request.output_path,
            image,
        },
        Ok(Err(error)) => {
            log::warn!("Request {} failed: {}", request_id, error);
            WorkerEvent::Failed {
                request_id,
                kind: error.kind(),
                message: error.to_string(),
            }
        },
        Err(_) => {
            log::error!("Request {} panicked", request_id);
            WorkerEvent::Failed {
                request_id,
                kind: ErrorKind::Internal,
                message: "Processing panicked".to_string(),
            }
        },
    };

    // Free the slot first so the receiver can submit again as soon as it sees the outcome
    drop(guard);
    let _ = events.send(event);
}
