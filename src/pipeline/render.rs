//! Document readers: count pages and rasterise one page at a time.
//!
//! The orchestrator only ever holds one page raster in memory, so readers
//! render on demand instead of up front.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! `tokio::task::spawn_blocking` keeps that work off the async worker
//! threads so progress events and control signals stay responsive.

use crate::error::ScribeError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of page rasters for a run.
///
/// Page numbers are 1-based throughout.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self) -> Result<usize, ScribeError>;

    /// Rasterise page `page` at `scale` × its natural size.
    async fn render_page(&self, page: usize, scale: f32) -> Result<DynamicImage, ScribeError>;
}

// ── PDF via pdfium ───────────────────────────────────────────────────────────

/// Reads a PDF file through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumReader {
    path: PathBuf,
    password: Option<String>,
}

impl PdfiumReader {
    pub fn new(path: impl Into<PathBuf>, password: Option<String>) -> Self {
        Self {
            path: path.into(),
            password,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentReader for PdfiumReader {
    async fn page_count(&self) -> Result<usize, ScribeError> {
        let path = self.path.clone();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || page_count_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| ScribeError::Internal(format!("Page count task panicked: {}", e)))?
    }

    async fn render_page(&self, page: usize, scale: f32) -> Result<DynamicImage, ScribeError> {
        let path = self.path.clone();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || {
            render_page_blocking(&path, password.as_deref(), page, scale)
        })
        .await
        .map_err(|e| ScribeError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ScribeError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ScribeError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                ScribeError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            ScribeError::CorruptPdf {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn page_count_blocking(path: &Path, password: Option<&str>) -> Result<usize, ScribeError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, path, password)?;
    let total = document.pages().len() as usize;
    info!("PDF loaded: {} pages", total);
    Ok(total)
}

fn render_page_blocking(
    path: &Path,
    password: Option<&str>,
    page: usize,
    scale: f32,
) -> Result<DynamicImage, ScribeError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, path, password)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    if page == 0 || page > total {
        return Err(ScribeError::PageOutOfRange { page, total });
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| ScribeError::RasterisationFailed {
            page,
            detail: format!("{:?}", e),
        })?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| ScribeError::RasterisationFailed {
            page,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} at scale {} → {}x{} px",
        page,
        scale,
        image.width(),
        image.height()
    );
    Ok(image)
}

// ── Image files ──────────────────────────────────────────────────────────────

/// Treats a list of image files as the pages of one document.
///
/// Scans are already rasters, so `scale` is ignored.
#[derive(Debug, Clone)]
pub struct ImageSequenceReader {
    pages: Vec<PathBuf>,
}

impl ImageSequenceReader {
    pub fn new(pages: Vec<PathBuf>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl DocumentReader for ImageSequenceReader {
    async fn page_count(&self) -> Result<usize, ScribeError> {
        Ok(self.pages.len())
    }

    async fn render_page(&self, page: usize, _scale: f32) -> Result<DynamicImage, ScribeError> {
        let total = self.pages.len();
        let path = page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .cloned()
            .ok_or(ScribeError::PageOutOfRange { page, total })?;

        tokio::task::spawn_blocking(move || {
            image::open(&path).map_err(|e| ScribeError::ImageLoadFailed {
                detail: e.to_string(),
                path,
            })
        })
        .await
        .map_err(|e| ScribeError::Internal(format!("Image decode task panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[tokio::test]
    async fn image_sequence_reads_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, w) in [30u32, 40].iter().enumerate() {
            let p = dir.path().join(format!("page{i}.png"));
            RgbImage::from_pixel(*w, 20, Rgb([255, 255, 255])).save(&p).unwrap();
            paths.push(p);
        }

        let reader = ImageSequenceReader::new(paths);
        assert_eq!(reader.page_count().await.unwrap(), 2);
        assert_eq!(reader.render_page(1, 2.0).await.unwrap().width(), 30);
        assert_eq!(reader.render_page(2, 2.0).await.unwrap().width(), 40);
    }

    #[tokio::test]
    async fn image_sequence_rejects_out_of_range() {
        let reader = ImageSequenceReader::new(vec![]);
        assert!(matches!(
            reader.render_page(0, 1.0).await,
            Err(ScribeError::PageOutOfRange { page: 0, total: 0 })
        ));
        assert!(matches!(
            reader.render_page(3, 1.0).await,
            Err(ScribeError::PageOutOfRange { page: 3, total: 0 })
        ));
    }

    #[tokio::test]
    async fn undecodable_image_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("broken.png");
        std::fs::write(&p, b"definitely not a png").unwrap();
        let reader = ImageSequenceReader::new(vec![p]);
        let err = reader.render_page(1, 1.0).await.unwrap_err();
        assert!(matches!(err, ScribeError::ImageLoadFailed { .. }));
    }
}
