//! Page merging: join a page's section transcripts under one numbering.
//!
//! Each section is transcribed with its own `L1:`, `L2:`, … labels. The
//! overlap lines were already suppressed by the recognizer (see
//! [`crate::pipeline::overlap`]), so merging is a plain concatenation in
//! section order followed by a continuous relabel. No second deduplication
//! pass happens here.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_LINE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^L\d+:\s*(.*)$").unwrap());

/// Merge section transcripts into one page transcript.
///
/// Blank lines are dropped, `L<n>: ` labels are stripped (any other line is
/// kept verbatim), and every remaining line is relabelled from `L1`.
/// Sections must be passed in ascending index order.
pub fn merge_sections<S: AsRef<str>>(section_texts: &[S]) -> String {
    section_texts
        .iter()
        .flat_map(|text| raw_lines(text.as_ref()))
        .enumerate()
        .map(|(i, line)| format!("L{}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number of lines a transcript contributes to a merged page.
pub fn count_lines(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

fn raw_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(strip_label)
}

fn strip_label(line: &str) -> &str {
    match RE_LINE_LABEL.captures(line).and_then(|c| c.get(1)) {
        Some(content) => content.as_str(),
        None => line,
    }
}
