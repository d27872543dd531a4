//! Observer trait for per-section and per-page transcription events.
//!
//! Attach an [`Arc<dyn TranscriptionObserver>`] with
//! [`crate::processor::BatchProcessor::set_observer`] to receive events as
//! the orchestrator works through the document. All methods have no-op
//! defaults, so implementors override only what they need.
//!
//! Callers that prefer a stream over callbacks can use [`EventChannel`],
//! which forwards every callback as a [`TranscriptionEvent`].
//!
//! # Example
//!
//! ```rust
//! use edgequake_scribe::progress::{PageComplete, TranscriptionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl TranscriptionObserver for PageCounter {
//!     fn on_page_complete(&self, event: &PageComplete) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {}/{}: {} lines", event.page, event.total_pages, event.total_lines);
//!     }
//! }
//! ```

use crate::error::RecognitionError;
use crate::output::{DocumentEstimate, TranscriptStats};
use crate::processor::ProcessorStatus;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A section finished successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionProgress {
    pub page: usize,
    pub section: usize,
    pub total_pages: usize,
    pub total_sections: usize,
    /// Sections attempted so far in this run, this one included.
    pub cumulative_section: usize,
    pub latest_text: String,
}

/// A section failed and was replaced by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionFailure {
    pub page: usize,
    pub section: usize,
    pub cumulative_section: usize,
    pub error: RecognitionError,
}

/// A page was merged and appended to the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageComplete {
    pub page: usize,
    pub total_pages: usize,
    pub total_lines: usize,
    pub merged_text: String,
}

/// Called by the orchestrator as it processes each section and page.
///
/// Events arrive strictly in processing order from a single task.
pub trait TranscriptionObserver: Send + Sync {
    /// Called once by `process_all` before the first page.
    fn on_run_start(&self, estimate: &DocumentEstimate) {
        let _ = estimate;
    }

    fn on_section_complete(&self, progress: &SectionProgress) {
        let _ = progress;
    }

    fn on_section_error(&self, failure: &SectionFailure) {
        let _ = failure;
    }

    fn on_page_complete(&self, page: &PageComplete) {
        let _ = page;
    }

    /// A page could not be rendered or sectioned; it was replaced by a
    /// single placeholder line.
    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    fn on_status_change(&self, status: ProcessorStatus) {
        let _ = status;
    }

    /// Called once when `process_all` returns, cancelled or not.
    fn on_run_complete(&self, stats: &TranscriptStats) {
        let _ = stats;
    }
}

/// A no-op observer. This is the default when none is attached.
pub struct NoopObserver;

impl TranscriptionObserver for NoopObserver {}

/// Convenience alias for the type stored by the orchestrator.
pub type SharedObserver = Arc<dyn TranscriptionObserver>;

// ── Event stream ─────────────────────────────────────────────────────────────

/// Owned form of every observer callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TranscriptionEvent {
    RunStarted(DocumentEstimate),
    SectionCompleted(SectionProgress),
    SectionFailed(SectionFailure),
    PageCompleted(PageComplete),
    PageFailed {
        page: usize,
        total_pages: usize,
        error: String,
    },
    StatusChanged {
        status: ProcessorStatus,
    },
    RunCompleted(TranscriptStats),
}

/// Observer that forwards every callback into an unbounded channel.
///
/// Sends never block the orchestrator; if the receiver was dropped the
/// events are discarded.
pub struct EventChannel {
    tx: mpsc::UnboundedSender<TranscriptionEvent>,
}

impl EventChannel {
    /// Create the observer and the stream that yields its events.
    pub fn new() -> (Self, UnboundedReceiverStream<TranscriptionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }

    fn send(&self, event: TranscriptionEvent) {
        let _ = self.tx.send(event);
    }
}

impl TranscriptionObserver for EventChannel {
    fn on_run_start(&self, estimate: &DocumentEstimate) {
        self.send(TranscriptionEvent::RunStarted(*estimate));
    }

    fn on_section_complete(&self, progress: &SectionProgress) {
        self.send(TranscriptionEvent::SectionCompleted(progress.clone()));
    }

    fn on_section_error(&self, failure: &SectionFailure) {
        self.send(TranscriptionEvent::SectionFailed(failure.clone()));
    }

    fn on_page_complete(&self, page: &PageComplete) {
        self.send(TranscriptionEvent::PageCompleted(page.clone()));
    }

    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        self.send(TranscriptionEvent::PageFailed {
            page,
            total_pages,
            error: error.to_string(),
        });
    }

    fn on_status_change(&self, status: ProcessorStatus) {
        self.send(TranscriptionEvent::StatusChanged { status });
    }

    fn on_run_complete(&self, stats: &TranscriptStats) {
        self.send(TranscriptionEvent::RunCompleted(stats.clone()));
    }
}
