//! Post-processing: deterministic cleanup of raw recognizer output.
//!
//! Even well-prompted models occasionally wrap their answer in a code fence,
//! emit Windows line endings, or leak zero-width characters copied from
//! their training data. Those artefacts would survive into the merged page
//! and, worse, into the overlap tail handed to the next section, where a
//! stray fence line would be treated as "already transcribed" text.
//!
//! Every rule is content-preserving: no line is reworded, reordered or
//! dropped except the fence lines themselves.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a section transcript.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip an outer code fence (```` ``` ```` or ```` ```text ````)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Trim leading and trailing blank lines
pub fn clean_section_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fence(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 2: Strip outer fence ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*?)\n?```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_with_language() {
        let input = "```text\nL1: a\nL2: b\n```";
        assert_eq!(clean_section_text(input), "L1: a\nL2: b");
    }

    #[test]
    fn strips_bare_fence() {
        let input = "```\nL1: a\n```\n";
        assert_eq!(clean_section_text(input), "L1: a");
    }

    #[test]
    fn inner_backticks_are_kept() {
        let input = "L1: use `x` here\nL2: done";
        assert_eq!(clean_section_text(input), input);
    }

    #[test]
    fn normalises_crlf() {
        assert_eq!(clean_section_text("L1: a\r\nL2: b\r\n"), "L1: a\nL2: b");
    }

    #[test]
    fn removes_invisible_chars() {
        assert_eq!(clean_section_text("\u{FEFF}L1: a\u{200B}b"), "L1: ab");
    }

    #[test]
    fn trims_trailing_spaces_only() {
        assert_eq!(clean_section_text("L1:  two  spaces   \n"), "L1:  two  spaces");
    }

    #[test]
    fn interior_blank_lines_survive() {
        assert_eq!(clean_section_text("\n\nL1: a\n\nL2: b\n\n"), "L1: a\n\nL2: b");
    }
}
