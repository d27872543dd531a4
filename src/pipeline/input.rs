//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! that lives as long as the [`ResolvedInput`]. The first bytes are sniffed
//! before returning so callers get a clear error instead of a pdfium crash,
//! and so scanned pages delivered as PNG/JPEG can skip pdfium entirely.

use crate::error::ScribeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// What kind of document the input turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A PDF, rendered page by page through pdfium.
    Pdf,
    /// A single raster image, treated as a one-page document.
    Image,
}

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, kind: InputKind },
    /// Input was a URL; the body was saved into a temp directory that is
    /// removed when this value is dropped.
    Downloaded {
        path: PathBuf,
        kind: InputKind,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    /// Local path to the document regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            ResolvedInput::Local { kind, .. } | ResolvedInput::Downloaded { kind, .. } => *kind,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local document.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ScribeError> {
    if input.trim().is_empty() {
        return Err(ScribeError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Classify a document by its leading bytes.
pub fn sniff_kind(path: &Path, head: &[u8]) -> Result<InputKind, ScribeError> {
    if head.starts_with(b"%PDF") {
        return Ok(InputKind::Pdf);
    }
    if image::guess_format(head).is_ok() {
        return Ok(InputKind::Image);
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(ScribeError::UnsupportedFormat {
        path: path.to_path_buf(),
        magic,
    })
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, ScribeError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(ScribeError::FileNotFound { path });
    }

    let head = match std::fs::File::open(&path) {
        Ok(f) => {
            let mut head = Vec::with_capacity(16);
            f.take(16)
                .read_to_end(&mut head)
                .map_err(|e| ScribeError::Internal(format!("Failed to read input: {}", e)))?;
            head
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ScribeError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ScribeError::FileNotFound { path });
        }
    };

    let kind = sniff_kind(&path, &head)?;
    debug!("Resolved local {:?}: {}", kind, path.display());
    Ok(ResolvedInput::Local { path, kind })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ScribeError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScribeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ScribeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ScribeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ScribeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ScribeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let temp_dir = TempDir::new().map_err(|e| ScribeError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));
    let kind = sniff_kind(&file_path, &bytes)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ScribeError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        kind,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.bin".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/a/scan.pdf?x=1"), "scan.pdf");
        assert_eq!(filename_from_url("https://x.org/a/"), "downloaded.bin");
    }

    #[test]
    fn sniffs_pdf_and_png() {
        let p = Path::new("x");
        assert_eq!(sniff_kind(p, b"%PDF-1.7\n").unwrap(), InputKind::Pdf);
        assert_eq!(
            sniff_kind(p, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap(),
            InputKind::Image
        );
        assert_eq!(sniff_kind(p, &[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(), InputKind::Image);
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let err = sniff_kind(Path::new("notes.txt"), b"hello").unwrap_err();
        match err {
            ScribeError::UnsupportedFormat { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            sniff_kind(Path::new("empty"), b""),
            Err(ScribeError::UnsupportedFormat { magic: [0, 0, 0, 0], .. })
        ));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ScribeError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_pdf_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.pdf");
        std::fs::write(&p, b"%PDF-1.4\n%%EOF\n").unwrap();
        let resolved = resolve_input(p.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.kind(), InputKind::Pdf);
        assert_eq!(resolved.path(), p.as_path());
    }
}
