//! Result types produced by a transcription run.

use crate::error::RecognitionError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// The merged, renumbered transcript of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page: usize,
    /// `L1: …` lines, newline-joined.
    pub text: String,
    pub total_lines: usize,
}

/// Outcome of one section request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResult {
    pub page: usize,
    pub section: usize,
    /// Cleaned service output, or the error placeholder.
    pub text: String,
    pub had_overlap: bool,
    pub line_count: usize,
    pub error: Option<RecognitionError>,
}

impl SectionResult {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Up-front size, time and cost estimate returned by `load()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentEstimate {
    pub total_pages: usize,
    pub total_sections: usize,
    pub estimated_seconds: f64,
    /// Rounded up to whole cents.
    pub estimated_cost_usd: f64,
}

impl DocumentEstimate {
    pub fn new(
        total_pages: usize,
        sections_per_page: usize,
        seconds_per_section: f64,
        cost_per_section_usd: f64,
    ) -> Self {
        let total_sections = total_pages * sections_per_page;
        let cost = total_sections as f64 * cost_per_section_usd;
        Self {
            total_pages,
            total_sections,
            estimated_seconds: total_sections as f64 * seconds_per_section,
            estimated_cost_usd: round_up_cents(cost),
        }
    }

    /// Whole minutes, rounded up.
    pub fn estimated_minutes(&self) -> u64 {
        (self.estimated_seconds / 60.0).ceil() as u64
    }
}

fn round_up_cents(usd: f64) -> f64 {
    // Guard against 0.015 * 100 = 1.4999999… style float noise.
    ((usd * 100.0 - 1e-9).ceil().max(0.0)) / 100.0
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages that produced a [`PageResult`].
    pub processed_pages: usize,
    pub sections_attempted: usize,
    pub failed_sections: usize,
    pub duration_ms: u64,
    /// True when the run stopped early on `cancel()`.
    pub cancelled: bool,
}

/// Everything a run hands back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptOutput {
    /// Page transcripts in page order.
    pub pages: Vec<PageResult>,
    /// Diagnostic list of the sections that were replaced by placeholders.
    pub failed_sections: Vec<SectionResult>,
    pub stats: TranscriptStats,
}

impl TranscriptOutput {
    /// Render the transcript as a Markdown document.
    pub fn to_markdown(&self, source_name: &str) -> String {
        let mut md = String::from("# Transcription\n\n");
        let _ = writeln!(md, "**Source**: {}", source_name);
        let _ = writeln!(md, "**Pages**: {}", self.pages.len());
        if self.stats.cancelled {
            md.push_str("**Status**: cancelled before completion\n");
        }
        if !self.failed_sections.is_empty() {
            let _ = writeln!(md, "**Failed sections**: {}", self.failed_sections.len());
        }
        md.push_str("\n---\n\n");

        for page in &self.pages {
            let _ = writeln!(md, "## Page {}\n", page.page);
            let _ = writeln!(md, "**Lines**: {}\n", page.total_lines);
            md.push_str(&page.text);
            md.push_str("\n\n---\n\n");
        }
        md
    }

    pub fn total_lines(&self) -> usize {
        self.pages.iter().map(|p| p.total_lines).sum()
    }
}
