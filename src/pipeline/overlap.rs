//! Overlap context: tell the recognizer which lines it has already seen.
//!
//! ## Why text instead of pixels?
//!
//! Consecutive bands share a 30 % strip of the page, so the same source
//! lines appear in both images. Deduplicating at the image level would mean
//! locating the seam on skewed, warped scans, which is fragile. We hand the
//! recognizer the exact trailing lines it produced for the previous band and
//! ask it to continue after them. Matching text against text is something a
//! vision LLM does reliably.

use crate::pipeline::layout::Layout;
use serde::{Deserialize, Serialize};

/// How many trailing non-empty lines of the previous band are carried over.
pub const OVERLAP_TAIL_LINES: usize = 10;

/// Deduplication context for one section request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapContext {
    pub has_overlap: bool,
    pub overlap_pixels: u32,
    /// Last non-empty lines of the previous section, in original order.
    pub previous_tail_lines: Vec<String>,
    /// Instructions to splice into the prompt; empty for the first section.
    pub instruction_text: String,
}

impl OverlapContext {
    /// Context for a section with nothing before it.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Build the overlap context for `section_index` (1-based).
///
/// `prior_texts` holds the recognized text of the sections already processed
/// on this page, in order; `prior_texts[section_index - 2]` is the
/// immediately preceding one.
pub fn build_context(
    layout: &Layout,
    section_index: usize,
    prior_texts: &[String],
) -> OverlapContext {
    if section_index <= 1 {
        return OverlapContext::none();
    }

    let overlap_pixels = layout
        .section(section_index)
        .map(|s| s.overlap_pixels)
        .unwrap_or(0);

    let previous = prior_texts
        .get(section_index - 2)
        .map(String::as_str)
        .unwrap_or("");
    let tail = tail_lines(previous, OVERLAP_TAIL_LINES);
    let instruction_text = render_instructions(&tail);

    OverlapContext {
        has_overlap: true,
        overlap_pixels,
        previous_tail_lines: tail,
        instruction_text,
    }
}

/// The last `n` non-empty lines of `text`, oldest first.
fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let mut tail: Vec<String> = text
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(n)
        .map(str::to_string)
        .collect();
    tail.reverse();
    tail
}

fn render_instructions(tail: &[String]) -> String {
    let mut out = String::from(
        "OVERLAP HANDLING:\n\
         This image overlaps with the previous section of the same page.\n",
    );

    if tail.is_empty() {
        out.push_str(
            "The previous section produced no text. Transcribe every line you see.\n",
        );
        return out;
    }

    out.push_str("The last lines already transcribed from the previous section were:\n");
    for (i, line) in tail.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, line));
    }
    out.push_str(
        "\nYOUR TASK:\n\
         1. Treat the lines above as already transcribed. Do not repeat them.\n\
         2. Find the last occurrence of these lines in this image and begin \
         your output strictly after it.\n\
         3. Output only lines that are NOT among the lines above.\n\
         4. Do not mark or comment on the skipped overlap lines.\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::compute_layout;

    fn numbered(n: usize) -> String {
        (1..=n)
            .map(|i| format!("L{i}: line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn first_section_has_no_overlap() {
        let layout = compute_layout(100, 1000).unwrap();
        let ctx = build_context(&layout, 1, &[]);
        assert!(!ctx.has_overlap);
        assert!(ctx.instruction_text.is_empty());
        assert!(ctx.previous_tail_lines.is_empty());
        assert_eq!(ctx.overlap_pixels, 0);
    }

    #[test]
    fn takes_last_ten_non_empty_lines() {
        let layout = compute_layout(100, 1000).unwrap();
        let prior = vec![numbered(25)];
        let ctx = build_context(&layout, 2, &prior);

        assert!(ctx.has_overlap);
        assert_eq!(ctx.overlap_pixels, 300);
        assert_eq!(ctx.previous_tail_lines.len(), 10);
        assert_eq!(ctx.previous_tail_lines[0], "L16: line 16");
        assert_eq!(ctx.previous_tail_lines[9], "L25: line 25");
        for line in &ctx.previous_tail_lines {
            assert!(ctx.instruction_text.contains(line.as_str()));
        }
        assert!(!ctx.instruction_text.contains("L15: line 15"));
    }

    #[test]
    fn blank_lines_do_not_count_towards_tail() {
        let layout = compute_layout(100, 1000).unwrap();
        let prior = vec!["a\n\n  \nb\n\nc\n\n".to_string()];
        let ctx = build_context(&layout, 2, &prior);
        assert_eq!(ctx.previous_tail_lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn uses_immediately_preceding_section() {
        let layout = compute_layout(100, 1000).unwrap();
        let prior = vec!["first".to_string(), "second".to_string(), "third".to_string()];
        let ctx = build_context(&layout, 3, &prior);
        assert_eq!(ctx.previous_tail_lines, vec!["second"]);
        let ctx = build_context(&layout, 4, &prior);
        assert_eq!(ctx.previous_tail_lines, vec!["third"]);
    }

    #[test]
    fn empty_previous_section_still_overlaps() {
        let layout = compute_layout(100, 1000).unwrap();
        let ctx = build_context(&layout, 2, &[String::new()]);
        assert!(ctx.has_overlap);
        assert!(ctx.previous_tail_lines.is_empty());
        assert!(!ctx.instruction_text.is_empty());
    }
}
