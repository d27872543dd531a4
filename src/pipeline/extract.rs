//! Section extraction: crop one band out of a page raster.

use crate::pipeline::layout::Section;
use image::DynamicImage;

/// Copy the rectangle described by `section` into a new, independently
/// owned raster. The page raster is not modified.
///
/// The returned buffer is as large as the band itself; callers drop it as
/// soon as it has been encoded for transport.
pub fn extract_section(page: &DynamicImage, section: &Section) -> DynamicImage {
    page.crop_imm(section.x, section.y, section.width, section.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::compute_layout;
    use image::{GenericImageView, Rgba, RgbaImage};

    /// Page whose pixel rows encode their own y coordinate in the red channel.
    fn striped_page(width: u32, height: u32) -> DynamicImage {
        let img = RgbaImage::from_fn(width, height, |_, y| Rgba([(y % 256) as u8, 0, 0, 255]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn crop_matches_section_geometry() {
        let page = striped_page(20, 200);
        let layout = compute_layout(20, 200).unwrap();

        for section in &layout.sections {
            let band = extract_section(&page, section);
            assert_eq!(band.dimensions(), (section.width, section.height));
            // First row of the band is the page row at section.y.
            assert_eq!(band.get_pixel(0, 0)[0], (section.y % 256) as u8);
            let last = section.height - 1;
            assert_eq!(
                band.get_pixel(0, last)[0],
                ((section.y + last) % 256) as u8
            );
        }
    }

    #[test]
    fn source_is_untouched() {
        let page = striped_page(8, 40);
        let before = page.clone();
        let layout = compute_layout(8, 40).unwrap();
        let _bands: Vec<_> = layout
            .sections
            .iter()
            .map(|s| extract_section(&page, s))
            .collect();
        assert_eq!(page.as_bytes(), before.as_bytes());
    }
}
