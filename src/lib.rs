//! # edgequake-scribe
//!
//! Transcribe scanned documents into line-numbered text with a vision
//! recognition service.
//!
//! ## Why sections instead of pages?
//!
//! Vision models read a dense, full-page scan poorly: small print blurs
//! once the page is downscaled to the model's input size, and long pages
//! invite skipped or invented lines. This crate cuts every page into four
//! horizontal bands that overlap by 30 % of the page height, so no line is
//! ever cut in half without also appearing whole in a neighbour. Each band
//! is sent on its own together with the last lines transcribed from the
//! band above, and the recognizer is told to continue after them. The band
//! transcripts are then concatenated and renumbered `L1:`, `L2:`, … per page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise one page (pdfium, spawn_blocking)
//!  ├─ 3. Layout     four overlapping bands: 65 % / 65 % / 65 % / 35 %
//!  ├─ 4. Overlap    last 10 lines of the previous band → prompt
//!  ├─ 5. Encode     PNG, JPEG recompression above 5 MB
//!  ├─ 6. Recognize  one request per band, strictly sequential
//!  └─ 7. Merge      strip labels, renumber per page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scribe::{transcribe, TranscriptionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = TranscriptionConfig::default();
//!     let output = transcribe("scan.pdf", &config).await?;
//!     for page in &output.pages {
//!         println!("## Page {}\n{}", page.page, page.text);
//!     }
//!     eprintln!("{} sections failed", output.failed_sections.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Pause, resume, cancel
//!
//! ```rust,no_run
//! use edgequake_scribe::{stream::transcribe_stream, TranscriptionConfig};
//! use tokio_stream::StreamExt;
//!
//! # async fn run() -> Result<(), edgequake_scribe::ScribeError> {
//! let mut run = transcribe_stream("scan.pdf", &TranscriptionConfig::default()).await?;
//! let handle = run.handle.clone();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.cancel();
//! });
//! while let Some(event) = run.events.next().await {
//!     eprintln!("{event:?}");
//! }
//! let output = run.join().await?;
//! # Ok(()) }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scribe` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-scribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod transcribe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSelection, TranscriptionConfig, TranscriptionConfigBuilder};
pub use error::{RecognitionError, ScribeError};
pub use output::{DocumentEstimate, PageResult, SectionResult, TranscriptOutput, TranscriptStats};
pub use pipeline::recognize::{HttpRecognizer, LlmRecognizer, Recognizer};
pub use pipeline::render::{DocumentReader, ImageSequenceReader, PdfiumReader};
pub use processor::{BatchProcessor, ProcessorHandle, ProcessorState, ProcessorStatus};
pub use progress::{NoopObserver, TranscriptionEvent, TranscriptionObserver};
pub use prompts::{DefaultPrompt, PromptStrategy, Vocabulary};
pub use stream::{transcribe_stream, TranscriptionStream};
pub use transcribe::{inspect, transcribe, transcribe_to_file};
