//! The batch orchestrator: a stateful, strictly sequential driver.
//!
//! [`BatchProcessor`] walks the selected pages one at a time and, within a
//! page, the four sections in order. Section `k`'s prompt depends on the
//! text section `k-1` produced, so nothing here runs concurrently.
//!
//! ## State machine
//!
//! ```text
//! Idle ──load()──▶ Loading ──ok──▶ Ready ──process_all()──▶ Processing ⇄ Paused
//!   ▲                 │                                          │
//!   └─────err─────────┘                         Completed ◀──────┤
//!                              Cancelled ◀── (Ready | Processing | Paused)
//! ```
//!
//! Control flows in through a [`ProcessorHandle`] (pause, resume, cancel)
//! and state flows out through `tokio::sync::watch` snapshots, so neither
//! side takes a lock. Cancellation is cooperative: it is observed at page
//! and section boundaries and never interrupts a request in flight.
//!
//! ## Failure policy
//!
//! * A failed section becomes a visible placeholder line and the page
//!   continues; the failure is also kept in a diagnostic list.
//! * A page that cannot be rendered becomes a one-line placeholder page and
//!   the run continues.
//! * Only load errors are fatal.

use crate::config::TranscriptionConfig;
use crate::error::{RecognitionError, ScribeError};
use crate::output::{
    DocumentEstimate, PageResult, SectionResult, TranscriptOutput, TranscriptStats,
};
use crate::pipeline::encode::{encode_section, EncodeLimits, SectionImage};
use crate::pipeline::extract::extract_section;
use crate::pipeline::layout::{compute_layout, Section, SECTIONS_PER_PAGE};
use crate::pipeline::merge::{count_lines, merge_sections};
use crate::pipeline::overlap::build_context;
use crate::pipeline::postprocess::clean_section_text;
use crate::pipeline::recognize::Recognizer;
use crate::pipeline::render::DocumentReader;
use crate::progress::{
    NoopObserver, PageComplete, SectionFailure, SectionProgress, SharedObserver,
};
use crate::prompts::SectionPromptContext;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of a [`BatchProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Processing,
    Paused,
    Completed,
    Cancelled,
}

impl ProcessorStatus {
    /// No further transitions happen from a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessorStatus::Completed | ProcessorStatus::Cancelled)
    }
}

/// Snapshot of the orchestrator's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorState {
    pub status: ProcessorStatus,
    /// Pages selected for this run.
    pub total_pages: usize,
    pub total_sections: usize,
    /// Page being (or last) processed; 0 before the first page.
    pub current_page: usize,
    /// Section being (or last) processed; 0 between pages.
    pub current_section: usize,
    pub paused: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Control {
    paused: bool,
    cancelled: bool,
}

/// Cloneable remote control for a running [`BatchProcessor`].
#[derive(Clone)]
pub struct ProcessorHandle {
    control: Arc<watch::Sender<Control>>,
    state: watch::Receiver<ProcessorState>,
}

impl ProcessorHandle {
    /// Stop before the next page. Has no effect once cancelled.
    pub fn pause(&self) {
        self.control.send_if_modified(|c| {
            let changed = !c.paused && !c.cancelled;
            c.paused |= changed;
            changed
        });
    }

    pub fn resume(&self) {
        self.control.send_if_modified(|c| std::mem::replace(&mut c.paused, false));
    }

    /// Stop at the next page or section boundary. Irreversible.
    pub fn cancel(&self) {
        self.control.send_modify(|c| {
            c.cancelled = true;
            c.paused = false;
        });
    }

    pub fn is_paused(&self) -> bool {
        self.control.borrow().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.borrow().cancelled
    }

    /// Latest published state, with the control flags as currently requested.
    pub fn state(&self) -> ProcessorState {
        snapshot(&self.state.borrow(), *self.control.borrow())
    }

    /// A receiver that wakes on every published state change.
    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.state.clone()
    }
}

/// Sequential section-wise transcription of one document.
pub struct BatchProcessor {
    reader: Arc<dyn DocumentReader>,
    recognizer: Arc<dyn Recognizer>,
    config: TranscriptionConfig,
    limits: EncodeLimits,
    observer: SharedObserver,
    control: Arc<watch::Sender<Control>>,
    state: watch::Sender<ProcessorState>,
    /// Pages selected for the run, 1-based, ascending. Empty until loaded.
    pages: Vec<usize>,
    document_pages: usize,
    estimate: Option<DocumentEstimate>,
    results: Vec<PageResult>,
    failed_sections: Vec<SectionResult>,
    sections_attempted: usize,
}

impl BatchProcessor {
    pub fn new(
        reader: Arc<dyn DocumentReader>,
        recognizer: Arc<dyn Recognizer>,
        config: TranscriptionConfig,
    ) -> Self {
        let (control, _) = watch::channel(Control::default());
        let (state, _) = watch::channel(ProcessorState::default());
        let limits = config.encode_limits();
        Self {
            reader,
            recognizer,
            config,
            limits,
            observer: Arc::new(NoopObserver),
            control: Arc::new(control),
            state,
            pages: Vec::new(),
            document_pages: 0,
            estimate: None,
            results: Vec::new(),
            failed_sections: Vec::new(),
            sections_attempted: 0,
        }
    }

    pub fn set_observer(&mut self, observer: SharedObserver) {
        self.observer = observer;
    }

    /// A control handle that stays valid for the processor's lifetime.
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            control: Arc::clone(&self.control),
            state: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> ProcessorState {
        snapshot(&self.state.borrow(), *self.control.borrow())
    }

    pub fn estimate(&self) -> Option<&DocumentEstimate> {
        self.estimate.as_ref()
    }

    /// Pages completed so far, in processing order.
    pub fn results(&self) -> &[PageResult] {
        &self.results
    }

    /// Sections that were replaced by placeholders.
    pub fn failed_sections(&self) -> &[SectionResult] {
        &self.failed_sections
    }

    // ── Loading ──────────────────────────────────────────────────────────

    /// Open the document, count pages and compute the run estimate.
    ///
    /// On failure the processor returns to `Idle` and may be loaded again.
    /// A finished processor cannot be reloaded.
    pub async fn load(&mut self) -> Result<DocumentEstimate, ScribeError> {
        self.ensure_not_finished()?;
        self.set_status(ProcessorStatus::Loading);

        match self.count_selected_pages().await {
            Ok((document_pages, pages)) => {
                let estimate = DocumentEstimate::new(
                    pages.len(),
                    SECTIONS_PER_PAGE,
                    self.config.seconds_per_section,
                    self.config.cost_per_section_usd,
                );
                info!(
                    "Loaded document: {} pages, {} selected, {} sections, ~{} min, ~${:.2}",
                    document_pages,
                    pages.len(),
                    estimate.total_sections,
                    estimate.estimated_minutes(),
                    estimate.estimated_cost_usd
                );
                self.document_pages = document_pages;
                self.pages = pages;
                self.estimate = Some(estimate);
                self.state.send_modify(|s| {
                    s.total_pages = estimate.total_pages;
                    s.total_sections = estimate.total_sections;
                });
                self.set_status(ProcessorStatus::Ready);
                Ok(estimate)
            }
            Err(e) => {
                warn!("Failed to load document: {}", e);
                self.set_status(ProcessorStatus::Idle);
                Err(e)
            }
        }
    }

    async fn count_selected_pages(&self) -> Result<(usize, Vec<usize>), ScribeError> {
        let total = self.reader.page_count().await?;
        if total == 0 {
            return Err(ScribeError::EmptyDocument);
        }
        let pages = self.config.pages.to_pages(total);
        if pages.is_empty() {
            return Err(ScribeError::InvalidConfig(format!(
                "page selection {:?} matches none of the {} pages",
                self.config.pages, total
            )));
        }
        Ok((total, pages))
    }

    // ── Whole run ────────────────────────────────────────────────────────

    /// Process every selected page in order.
    ///
    /// A cancel is not an error: the pages merged so far are returned with
    /// `stats.cancelled = true`. Once the run has completed or been
    /// cancelled, further calls return `ScribeError::AlreadyFinished`.
    pub async fn process_all(&mut self) -> Result<TranscriptOutput, ScribeError> {
        let estimate = self.estimate.ok_or(ScribeError::NotLoaded)?;
        self.ensure_not_finished()?;
        let started = Instant::now();
        self.observer.on_run_start(&estimate);

        let pages = self.pages.clone();
        let mut cancelled = false;

        for (i, &page) in pages.iter().enumerate() {
            if !self.wait_while_paused().await {
                cancelled = true;
                break;
            }

            match self.process_page(page).await {
                Ok(_) => {}
                Err(ScribeError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            }

            if i + 1 < pages.len() && self.config.page_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.page_pause_ms)).await;
            }
        }

        if cancelled {
            info!("Run cancelled after {} pages", self.results.len());
            self.set_status(ProcessorStatus::Cancelled);
        } else {
            self.state.send_modify(|s| s.current_section = 0);
            self.set_status(ProcessorStatus::Completed);
        }

        let stats = TranscriptStats {
            total_pages: pages.len(),
            processed_pages: self.results.len(),
            sections_attempted: self.sections_attempted,
            failed_sections: self.failed_sections.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
        };
        info!(
            "Run finished: {}/{} pages, {} failed sections, {}ms",
            stats.processed_pages, stats.total_pages, stats.failed_sections, stats.duration_ms
        );
        self.observer.on_run_complete(&stats);

        Ok(TranscriptOutput {
            pages: self.results.clone(),
            failed_sections: self.failed_sections.clone(),
            stats,
        })
    }

    /// Block while paused. Returns `false` if the run was cancelled.
    async fn wait_while_paused(&mut self) -> bool {
        let mut control = self.control.subscribe();
        let current = *control.borrow_and_update();
        if current.cancelled {
            return false;
        }
        if !current.paused {
            return true;
        }

        info!("Paused before page {}", self.state.borrow().current_page + 1);
        self.set_status(ProcessorStatus::Paused);
        let released = match control.wait_for(|c| !c.paused || c.cancelled).await {
            Ok(c) => *c,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => Control::default(),
        };
        if released.cancelled {
            return false;
        }
        info!("Resumed");
        self.set_status(ProcessorStatus::Processing);
        true
    }

    // ── One page ─────────────────────────────────────────────────────────

    /// Transcribe one page (1-based) and append it to the results.
    ///
    /// Returns `Err(ScribeError::Cancelled)` if a cancel is observed before
    /// or during the page; a partially transcribed page is discarded.
    pub async fn process_page(&mut self, page: usize) -> Result<PageResult, ScribeError> {
        if self.estimate.is_none() {
            return Err(ScribeError::NotLoaded);
        }
        self.ensure_not_finished()?;
        if page == 0 || page > self.document_pages {
            return Err(ScribeError::PageOutOfRange {
                page,
                total: self.document_pages,
            });
        }
        if self.is_cancelled() {
            self.set_status(ProcessorStatus::Cancelled);
            return Err(ScribeError::Cancelled);
        }

        self.set_status(ProcessorStatus::Processing);
        self.state.send_modify(|s| {
            s.current_page = page;
            s.current_section = 0;
        });
        info!("Processing page {} ({} selected)", page, self.pages.len());

        let raster = match self.reader.render_page(page, self.config.scale).await {
            Ok(img) => img,
            Err(e) => return Ok(self.fail_page(page, &e)),
        };

        let section_texts = match self.transcribe_sections(page, &raster).await {
            Ok(texts) => texts,
            Err(PageAbort::Cancelled) => {
                info!("Cancelled during page {}; partial page discarded", page);
                self.set_status(ProcessorStatus::Cancelled);
                return Err(ScribeError::Cancelled);
            }
            Err(PageAbort::Layout(e)) => return Ok(self.fail_page(page, &e)),
        };
        drop(raster);

        let text = merge_sections(&section_texts);
        let total_lines = count_lines(&text);
        let result = PageResult {
            page,
            text,
            total_lines,
        };
        info!("Page {} complete: {} lines", page, total_lines);

        self.results.push(result.clone());
        self.observer.on_page_complete(&PageComplete {
            page,
            total_pages: self.pages.len(),
            total_lines,
            merged_text: result.text.clone(),
        });
        Ok(result)
    }

    async fn transcribe_sections(
        &mut self,
        page: usize,
        raster: &DynamicImage,
    ) -> Result<Vec<String>, PageAbort> {
        let layout =
            compute_layout(raster.width(), raster.height()).map_err(PageAbort::Layout)?;
        debug!(
            "Page {} layout: {}x{} px, {} sections, {} px total overlap",
            page,
            layout.page_width,
            layout.page_height,
            layout.len(),
            layout.total_overlap()
        );

        let mut texts: Vec<String> = Vec::with_capacity(layout.len());
        for section in &layout.sections {
            if self.is_cancelled() {
                return Err(PageAbort::Cancelled);
            }
            self.state.send_modify(|s| s.current_section = section.index);
            self.sections_attempted += 1;

            let overlap = build_context(&layout, section.index, &texts);
            let prompt = self.config.prompt.build(&SectionPromptContext {
                page,
                section: section.index,
                position: section.position,
                overlap: &overlap,
            });

            let outcome = self.recognize_section(page, section, raster, &prompt).await;
            let result = match outcome {
                Ok(raw) => {
                    let text = clean_section_text(&raw);
                    debug!(
                        "Page {} section {}: {} lines",
                        page,
                        section.index,
                        count_lines(&text)
                    );
                    self.observer.on_section_complete(&SectionProgress {
                        page,
                        section: section.index,
                        total_pages: self.pages.len(),
                        total_sections: self.pages.len() * SECTIONS_PER_PAGE,
                        cumulative_section: self.sections_attempted,
                        latest_text: text.clone(),
                    });
                    SectionResult {
                        page,
                        section: section.index,
                        line_count: count_lines(&text),
                        text,
                        had_overlap: overlap.has_overlap,
                        error: None,
                    }
                }
                Err(error) => {
                    warn!("Page {} section {} failed: {}", page, section.index, error);
                    let text = placeholder(page, section.index, &error);
                    self.observer.on_section_error(&SectionFailure {
                        page,
                        section: section.index,
                        cumulative_section: self.sections_attempted,
                        error: error.clone(),
                    });
                    let failed = SectionResult {
                        page,
                        section: section.index,
                        line_count: 1,
                        text,
                        had_overlap: overlap.has_overlap,
                        error: Some(error),
                    };
                    self.failed_sections.push(failed.clone());
                    failed
                }
            };
            texts.push(result.text);
        }
        Ok(texts)
    }

    async fn recognize_section(
        &self,
        page: usize,
        section: &Section,
        raster: &DynamicImage,
        prompt: &str,
    ) -> Result<String, RecognitionError> {
        let crop = extract_section(raster, section);
        let encoded = encode_section(&crop, &self.limits).map_err(|e| RecognitionError::Encoding {
            message: e.to_string(),
        })?;
        drop(crop);
        debug!(
            "Page {} section {} ({}): {} bytes {}",
            page,
            section.index,
            section.position.label(),
            encoded.bytes.len(),
            encoded.mime_type
        );
        self.recognize_with_retry(&encoded, prompt, page, section.index)
            .await
    }

    async fn recognize_with_retry(
        &self,
        image: &SectionImage,
        prompt: &str,
        page: usize,
        section: usize,
    ) -> Result<String, RecognitionError> {
        let mut attempt: u32 = 0;
        loop {
            match self.recognizer.recognize(image, prompt).await {
                Ok(text) => return Ok(text),
                Err(e)
                    if e.is_retryable()
                        && attempt < self.config.max_retries
                        && !self.is_cancelled() =>
                {
                    attempt += 1;
                    let delay = backoff_delay(self.config.retry_backoff_ms, attempt);
                    warn!(
                        "Page {} section {} attempt {} failed ({}); retrying in {}ms",
                        page, section, attempt, e, delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fail_page(&mut self, page: usize, error: &ScribeError) -> PageResult {
        warn!("Page {} could not be rendered: {}", page, error);
        let line = format!(
            "[ERROR: Could not render page {} - {}]",
            page,
            single_line(&error.to_string())
        );
        let result = PageResult {
            page,
            text: merge_sections(&[line]),
            total_lines: 1,
        };
        self.results.push(result.clone());
        self.observer
            .on_page_error(page, self.pages.len(), &error.to_string());
        result
    }

    // ── State plumbing ───────────────────────────────────────────────────

    fn ensure_not_finished(&self) -> Result<(), ScribeError> {
        if self.state.borrow().status.is_terminal() {
            return Err(ScribeError::AlreadyFinished);
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.control.borrow().cancelled
    }

    fn set_status(&self, status: ProcessorStatus) {
        let changed = self.state.send_if_modified(|s| {
            if s.status == status {
                return false;
            }
            s.status = status;
            true
        });
        if changed {
            debug!("Status → {:?}", status);
            self.observer.on_status_change(status);
        }
    }
}

/// Why a page stopped before merging.
enum PageAbort {
    Cancelled,
    Layout(ScribeError),
}

/// Merge a published state with the requested control flags. A cancel
/// requested on a live run reads as `Cancelled` before the run observes it.
fn snapshot(state: &ProcessorState, control: Control) -> ProcessorState {
    let mut state = state.clone();
    state.paused = control.paused;
    state.cancelled = control.cancelled;
    if control.cancelled
        && matches!(
            state.status,
            ProcessorStatus::Ready | ProcessorStatus::Processing | ProcessorStatus::Paused
        )
    {
        state.status = ProcessorStatus::Cancelled;
    }
    state
}

/// A placeholder always occupies exactly one line of the merged page.
fn placeholder(page: usize, section: usize, error: &RecognitionError) -> String {
    format!(
        "[ERROR: Could not transcribe page {} section {} - {}]",
        page,
        section,
        single_line(&error.to_string())
    )
}

fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `base * 2^(attempt-1)`, saturating.
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(20))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(500, 1), 500);
        assert_eq!(backoff_delay(500, 2), 1000);
        assert_eq!(backoff_delay(500, 3), 2000);
        assert_eq!(backoff_delay(u64::MAX, 5), u64::MAX);
    }

    #[test]
    fn placeholder_names_page_section_and_cause() {
        let e = RecognitionError::Timeout { secs: 25 };
        assert_eq!(
            placeholder(2, 3, &e),
            "[ERROR: Could not transcribe page 2 section 3 - recognition timed out after 25s]"
        );
    }

    #[test]
    fn placeholder_flattens_multiline_causes() {
        let e = RecognitionError::Service {
            status: Some(502),
            message: "<html>\n  L9: Bad Gateway\r\n</html>".into(),
        };
        let text = placeholder(1, 2, &e);
        assert_eq!(text.lines().count(), 1);
        assert_eq!(
            text,
            "[ERROR: Could not transcribe page 1 section 2 - \
             service error (HTTP 502): <html> L9: Bad Gateway </html>]"
        );
    }

    #[test]
    fn cancel_reads_as_cancelled_until_terminal() {
        let cancel = Control {
            paused: false,
            cancelled: true,
        };
        for status in [
            ProcessorStatus::Ready,
            ProcessorStatus::Processing,
            ProcessorStatus::Paused,
        ] {
            let state = ProcessorState {
                status,
                ..ProcessorState::default()
            };
            assert_eq!(snapshot(&state, cancel).status, ProcessorStatus::Cancelled);
        }
        let done = ProcessorState {
            status: ProcessorStatus::Completed,
            ..ProcessorState::default()
        };
        assert_eq!(snapshot(&done, cancel).status, ProcessorStatus::Completed);
        let idle = ProcessorState::default();
        assert_eq!(snapshot(&idle, Control::default()).status, idle.status);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ProcessorStatus::Completed.is_terminal());
        assert!(ProcessorStatus::Cancelled.is_terminal());
        assert!(!ProcessorStatus::Paused.is_terminal());
    }
}
