//! Page sectioning: split a page raster into overlapping horizontal bands.
//!
//! ## Why bands instead of whole pages?
//!
//! Vision models read dense, small print far more faithfully when the text
//! fills the image. Four bands of 65 % page height each give the model
//! roughly 1.5× the effective resolution of a whole-page request, while the
//! 30 % overlap guarantees that no text line is ever cut in half at a seam:
//! any line split by one band boundary lies whole inside its neighbour.
//!
//! The layout is a pure function of the page's pixel dimensions and is
//! recomputed for every page; pages of one document may differ in size.

use crate::error::ScribeError;
use serde::{Deserialize, Serialize};

/// Number of bands each page is split into.
pub const SECTIONS_PER_PAGE: usize = 4;

/// Height of bands 1–3, in percent of page height.
const BAND_PERCENT: u64 = 65;

/// Height of the final band, in percent of page height.
const LAST_BAND_PERCENT: u64 = 35;

/// Vertical overlap between consecutive bands, in percent of page height.
const OVERLAP_PERCENT: u64 = 30;

/// Vertical position of a band on the page, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionPosition {
    Top,
    MidTop,
    MidBottom,
    Bottom,
}

impl SectionPosition {
    /// Position for a 1-based section index.
    pub fn for_index(index: usize) -> Self {
        match index {
            1 => SectionPosition::Top,
            2 => SectionPosition::MidTop,
            3 => SectionPosition::MidBottom,
            _ => SectionPosition::Bottom,
        }
    }

    /// Human-readable label used in prompts and logs.
    pub fn label(self) -> &'static str {
        match self {
            SectionPosition::Top => "top",
            SectionPosition::MidTop => "mid-top",
            SectionPosition::MidBottom => "mid-bottom",
            SectionPosition::Bottom => "bottom",
        }
    }
}

/// One band of a page, in page pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// 1-based index, top to bottom.
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub position: SectionPosition,
    pub overlaps_with_previous: bool,
    /// Nominal overlap with the previous band; 0 for the first band.
    pub overlap_pixels: u32,
}

impl Section {
    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// The band layout of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub page_width: u32,
    pub page_height: u32,
    pub sections: Vec<Section>,
}

impl Layout {
    /// Look up a section by its 1-based index.
    pub fn section(&self, index: usize) -> Option<&Section> {
        index.checked_sub(1).and_then(|i| self.sections.get(i))
    }

    /// Overlapping rows summed over all band seams.
    pub fn total_overlap(&self) -> u32 {
        self.sections.iter().map(|s| s.overlap_pixels).sum()
    }

    /// Number of sections on the page.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True when the page has no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Compute the overlapping band layout for a page of the given size.
///
/// Bands 1–3 are `floor(0.65·H)` tall, band 4 is `floor(0.35·H)`; the
/// overlap is `floor(0.30·H)`. Band 2 starts `overlap` rows above the end of
/// band 1, band 3 is bottom-aligned, band 4 covers the last 35 % of the page.
///
/// On very small pages the floors collapse towards zero, so every band is at
/// least one row tall and every `y` is clamped into `[0, H − height]`.
pub fn compute_layout(page_width: u32, page_height: u32) -> Result<Layout, ScribeError> {
    if page_width == 0 || page_height == 0 {
        return Err(ScribeError::InvalidPageDimensions {
            width: page_width,
            height: page_height,
        });
    }

    let h = page_height as i64;
    let band = percent_of(page_height, BAND_PERCENT).max(1);
    let last_band = percent_of(page_height, LAST_BAND_PERCENT).max(1);
    let overlap = percent_of(page_height, OVERLAP_PERCENT);

    let tops = [0, band - overlap, h - band, h - last_band];
    let heights = [band, band, band, last_band];

    let sections = (0..SECTIONS_PER_PAGE)
        .map(|i| {
            let height = heights[i].min(h);
            let y = tops[i].clamp(0, h - height);
            let index = i + 1;
            Section {
                index,
                x: 0,
                y: y as u32,
                width: page_width,
                height: height as u32,
                position: SectionPosition::for_index(index),
                overlaps_with_previous: index > 1,
                overlap_pixels: if index > 1 { overlap as u32 } else { 0 },
            }
        })
        .collect();

    Ok(Layout {
        page_width,
        page_height,
        sections,
    })
}

/// `floor(value · percent / 100)` in integer arithmetic, so that e.g. 30 % of
/// 2200 is exactly 660 rather than whatever `2200.0 * 0.3` rounds to.
fn percent_of(value: u32, percent: u64) -> i64 {
    (value as u64 * percent / 100) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_rows(layout: &Layout) -> Vec<bool> {
        let mut rows = vec![false; layout.page_height as usize];
        for s in &layout.sections {
            for r in s.y..s.bottom() {
                rows[r as usize] = true;
            }
        }
        rows
    }

    #[test]
    fn letter_page_layout() {
        let layout = compute_layout(1700, 2200).unwrap();
        assert_eq!(layout.len(), 4);

        let s = &layout.sections;
        assert_eq!((s[0].y, s[0].height), (0, 1430));
        assert_eq!((s[1].y, s[1].height), (1430 - 660, 1430));
        assert_eq!((s[2].y, s[2].height), (2200 - 1430, 1430));
        assert_eq!((s[3].y, s[3].height), (2200 - 770, 770));
        assert!(s.iter().all(|sec| sec.width == 1700 && sec.x == 0));
        assert_eq!(layout.total_overlap(), 660 * 3);
    }

    #[test]
    fn sections_cover_every_row() {
        for h in [1u32, 2, 3, 7, 10, 99, 100, 101, 997, 2200, 3301] {
            let layout = compute_layout(10, h).unwrap();
            assert_eq!(layout.len(), SECTIONS_PER_PAGE, "h={h}");
            assert_eq!(layout.sections[0].y, 0, "h={h}");
            assert!(
                covered_rows(&layout).iter().all(|&c| c),
                "rows left uncovered for h={h}: {layout:?}"
            );
            assert!(layout.sections.iter().all(|s| s.bottom() <= h), "h={h}");
        }
    }

    #[test]
    fn overlap_is_thirty_percent() {
        for h in [100u32, 1000, 2339, 4096] {
            let layout = compute_layout(50, h).unwrap();
            let expected = h * 30 / 100;
            let s = &layout.sections;
            assert_eq!(s[0].overlap_pixels, 0);
            assert!(!s[0].overlaps_with_previous);
            for sec in &s[1..] {
                assert!(sec.overlaps_with_previous);
                assert_eq!(sec.overlap_pixels, expected, "h={h}");
            }
            // Geometric seam between bands 1 and 2.
            assert_eq!(s[0].bottom() - s[1].y, expected, "h={h}");
        }
    }

    #[test]
    fn positions_run_top_to_bottom() {
        let layout = compute_layout(10, 100).unwrap();
        let positions: Vec<_> = layout.sections.iter().map(|s| s.position).collect();
        assert_eq!(
            positions,
            vec![
                SectionPosition::Top,
                SectionPosition::MidTop,
                SectionPosition::MidBottom,
                SectionPosition::Bottom
            ]
        );
        assert_eq!(layout.section(3).map(|s| s.index), Some(3));
        assert!(layout.section(0).is_none());
        assert!(layout.section(5).is_none());
    }

    #[test]
    fn tiny_page_never_inverts() {
        let layout = compute_layout(4, 1).unwrap();
        for s in &layout.sections {
            assert_eq!(s.y, 0);
            assert_eq!(s.height, 1);
        }
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(
            compute_layout(0, 100),
            Err(ScribeError::InvalidPageDimensions { width: 0, .. })
        ));
        assert!(compute_layout(100, 0).is_err());
    }
}
