//! Prompts for section-wise transcription.
//!
//! Every prompt the crate sends is built here, behind the [`PromptStrategy`]
//! trait. Keeping them in one place means a wording change touches one file,
//! and tests can inspect prompts without calling a service.
//!
//! The default strategy asks for strict letter-for-letter transcription with
//! `L<n>: ` line labels, splices in the overlap instructions for sections
//! 2–4, and optionally appends a [`Vocabulary`] of verified words that helps
//! with archaic scripts.

use crate::error::ScribeError;
use crate::pipeline::layout::{SectionPosition, SECTIONS_PER_PAGE};
use crate::pipeline::overlap::OverlapContext;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Everything a strategy may use to build the prompt for one section.
#[derive(Debug, Clone, Copy)]
pub struct SectionPromptContext<'a> {
    /// 1-based page number.
    pub page: usize,
    /// 1-based section index within the page.
    pub section: usize,
    pub position: SectionPosition,
    pub overlap: &'a OverlapContext,
}

/// Builds the text prompt sent with each section image.
pub trait PromptStrategy: Send + Sync {
    fn build(&self, ctx: &SectionPromptContext<'_>) -> String;
}

// ── Default prompt ───────────────────────────────────────────────────────────

/// Core rules shared by every section.
pub const TRANSCRIPTION_RULES: &str = r#"You are a precise OCR tool, not an assistant. Copy exactly what you see, letter for letter.

LETTERS AND WORDS
1. Transcribe every letter as it appears. Do not interpret.
2. Keep capitalisation exactly as in the original.
3. Do not modernise, correct or expand spelling or abbreviations.
4. Do not add, remove or reorder words.
5. If a letter is illegible, write [?] for that letter. Never guess.

SPACING AND LINES
6. Keep every line break exactly as in the original. Do not join lines.
7. Keep punctuation and numbers exactly as written.

PAGE FURNITURE
8. Include page numbers as [PAGE: n] and running heads as [RUNNING HEADER: text].
9. Include headings as [HEADER: text].
10. Include margin notes as [SIDENOTE: text] at the end of the line they belong to.
11. Mark damaged or unreadable passages with [?] or [illegible].

LINE NUMBERS
- Prefix every line with its number: L1: text, L2: text, ...
- Start at L1 for this section.
- For an empty line write: Ln: [blank]

OUTPUT
- Output only the numbered lines. No commentary, no code fences."#;

/// The built-in strategy.
#[derive(Debug, Clone, Default)]
pub struct DefaultPrompt {
    vocabulary: Option<Vocabulary>,
}

impl DefaultPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append verified-word hints to every prompt.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }
}

impl PromptStrategy for DefaultPrompt {
    fn build(&self, ctx: &SectionPromptContext<'_>) -> String {
        let mut prompt = format!(
            "You are transcribing SECTION {} of {} from page {}.\n\
             This is the {} horizontal band of the page (top to bottom).\n\n",
            ctx.section,
            SECTIONS_PER_PAGE,
            ctx.page,
            ctx.position.label()
        );

        if ctx.overlap.has_overlap {
            prompt.push_str(&ctx.overlap.instruction_text);
            prompt.push('\n');
        }

        prompt.push_str(TRANSCRIPTION_RULES);

        if ctx.overlap.has_overlap {
            prompt.push_str("\n- Skip lines that were already transcribed in the previous section.");
        }

        if let Some(vocabulary) = &self.vocabulary {
            prompt.push_str("\n\n");
            prompt.push_str(&vocabulary.render());
        }

        prompt
    }
}

// ── Vocabulary ───────────────────────────────────────────────────────────────

/// Reference words from verified transcriptions of similar documents.
///
/// Loaded from JSON:
///
/// ```json
/// {
///   "groups": [{ "label": "Verbs", "words": ["hafde", "blef"] }],
///   "substitutions": [{ "from": "ſ", "to": "s" }],
///   "phrases": ["Aar efter Christi Fødsel"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub groups: Vec<WordGroup>,
    pub substitutions: Vec<Substitution>,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordGroup {
    pub label: String,
    pub words: Vec<String>,
}

/// A glyph-to-modern-letter mapping, e.g. long s to `s`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

impl Vocabulary {
    pub fn from_json(json: &str) -> Result<Self, ScribeError> {
        serde_json::from_str(json)
            .map_err(|e| ScribeError::InvalidConfig(format!("vocabulary JSON: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, ScribeError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ScribeError::InvalidConfig(format!("cannot read vocabulary '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.words.is_empty())
            && self.substitutions.is_empty()
            && self.phrases.is_empty()
    }

    fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::from(
            "VERIFIED WORDS FROM SIMILAR DOCUMENTS\n\
             These are reference examples only. Always follow the image, never the list.\n",
        );

        for group in self.groups.iter().filter(|g| !g.words.is_empty()) {
            let _ = writeln!(out, "\n{}: {}", group.label, group.words.join(", "));
        }

        if !self.substitutions.is_empty() {
            out.push_str("\nLETTER SUBSTITUTIONS:\n");
            for s in &self.substitutions {
                let _ = writeln!(out, "- {} → {}", s.from, s.to);
            }
        }

        if !self.phrases.is_empty() {
            out.push_str("\nCOMMON PHRASES:\n");
            for p in &self.phrases {
                let _ = writeln!(out, "- \"{}\"", p);
            }
        }

        out.trim_end().to_string()
    }
}
