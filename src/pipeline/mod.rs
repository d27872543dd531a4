//! Pipeline stages for section-wise transcription.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestrator in [`crate::processor`] stays a thin sequencer.
//!
//! ## Data Flow (per page)
//!
//! ```text
//! render ──▶ layout ──▶ extract ──▶ overlap ──▶ encode ──▶ recognize ──▶ postprocess
//! (raster)   (4 bands)  (crop)      (tail ctx)  (PNG/JPEG) (service)     (cleanup)
//!                                                                            │
//!                                                           merge ◀──────────┘
//!                                                        (L1…Ln relabel)
//! ```
//!
//! 1. [`input`]: canonicalise the path or URL to a local PDF or image
//! 2. [`render`]: rasterise one page; pdfium runs in `spawn_blocking`
//! 3. [`layout`]: split the page height into four overlapping bands
//! 4. [`extract`]: crop one band into its own raster
//! 5. [`overlap`]: tail of the previous band's text plus dedup instructions
//! 6. [`encode`]: PNG, or JPEG recompression above the transport limit
//! 7. [`recognize`]: the only stage with network I/O
//! 8. [`postprocess`]: strip fences, CRLF and invisible characters
//! 9. [`merge`]: concatenate the bands and renumber lines per page

pub mod encode;
pub mod extract;
pub mod input;
pub mod layout;
pub mod merge;
pub mod overlap;
pub mod postprocess;
pub mod recognize;
pub mod render;
