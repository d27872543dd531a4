//! Error types for the edgequake-scribe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScribeError`]: **Fatal**: the run cannot proceed at all (unreadable
//!   document, zero pages, provider not configured). Returned as
//!   `Err(ScribeError)` from `load()` and the top-level `transcribe*`
//!   functions.
//!
//! * [`RecognitionError`]: **Non-fatal**: one section failed at the
//!   recognition service (error status, timeout, network). The orchestrator
//!   replaces the section with a visible placeholder and keeps going, so a
//!   single bad section never forfeits a multi-hundred-page run.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-scribe library.
///
/// Section-level failures use [`RecognitionError`] and are stored in
/// [`crate::output::SectionResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ScribeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file is neither a PDF nor an image format we can decode.
    #[error("Unsupported document format: '{path}'\nFirst bytes: {magic:?}")]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened fine but has nothing to transcribe.
    #[error("Document has no pages")]
    EmptyDocument,

    /// A page image could not be decoded from disk.
    #[error("Failed to read image '{path}': {detail}")]
    ImageLoadFailed { path: PathBuf, detail: String },

    /// Selected page number exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Rendering a page to a raster failed.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page has a zero-sized side and cannot be sectioned.
    #[error("Cannot section a {width}x{height} page")]
    InvalidPageDimensions { width: u32, height: u32 },

    /// A section raster could not be encoded for transport.
    #[error("Failed to encode section image: {0}")]
    ImageEncoding(String),

    // ── Run-state errors ──────────────────────────────────────────────────
    /// A processing call was made before a successful `load()`.
    #[error("Document is not loaded; call load() first")]
    NotLoaded,

    /// The run was cancelled. Not a failure: completed pages are kept.
    #[error("Processing was cancelled")]
    Cancelled,

    /// The run already completed or was cancelled. A processor runs once.
    #[error("The run has already finished; create a new processor to run again")]
    AlreadyFinished,

    // ── Recognition setup errors ──────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Recognition provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScribeError {
    /// True for errors raised while opening the document, before any page
    /// has been touched.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            ScribeError::FileNotFound { .. }
                | ScribeError::PermissionDenied { .. }
                | ScribeError::InvalidInput { .. }
                | ScribeError::DownloadFailed { .. }
                | ScribeError::DownloadTimeout { .. }
                | ScribeError::UnsupportedFormat { .. }
                | ScribeError::CorruptPdf { .. }
                | ScribeError::PasswordRequired { .. }
                | ScribeError::WrongPassword { .. }
                | ScribeError::EmptyDocument
                | ScribeError::ImageLoadFailed { .. }
        )
    }
}

/// A non-fatal error for a single section recognition call.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RecognitionError {
    /// The service answered with a non-success status.
    #[error("{}", format_service(*status, message))]
    Service {
        status: Option<u16>,
        message: String,
    },

    /// No response within the request deadline.
    #[error("recognition timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or body-decoding failure below the service level.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The section raster could not be encoded for the request.
    #[error("could not encode section image: {message}")]
    Encoding { message: String },
}

fn format_service(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("service error (HTTP {code}): {message}"),
        None => format!("service error: {message}"),
    }
}

impl RecognitionError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Client errors (4xx other than 429) are permanent; everything else is
    /// worth retrying when the orchestrator is configured to.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecognitionError::Service {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            RecognitionError::Service { status: None, .. } => true,
            RecognitionError::Timeout { .. } | RecognitionError::Transport { .. } => true,
            RecognitionError::Encoding { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_display_with_status() {
        let e = RecognitionError::Service {
            status: Some(503),
            message: "overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("overloaded"), "got: {msg}");
    }

    #[test]
    fn service_display_without_status() {
        let e = RecognitionError::Service {
            status: None,
            message: "bad response".into(),
        };
        assert_eq!(e.to_string(), "service error: bad response");
    }

    #[test]
    fn timeout_is_distinct_from_service() {
        let e = RecognitionError::Timeout { secs: 25 };
        assert!(e.to_string().contains("25s"));
        assert!(!matches!(e, RecognitionError::Service { .. }));
    }

    #[test]
    fn retryable_classification() {
        let client = RecognitionError::Service {
            status: Some(400),
            message: "bad".into(),
        };
        let limited = RecognitionError::Service {
            status: Some(429),
            message: "slow down".into(),
        };
        assert!(!client.is_retryable());
        assert!(limited.is_retryable());
        assert!(RecognitionError::Timeout { secs: 1 }.is_retryable());
        assert!(RecognitionError::Transport {
            message: "reset".into()
        }
        .is_retryable());
        assert!(!RecognitionError::Encoding {
            message: "bad raster".into()
        }
        .is_retryable());
    }

    #[test]
    fn load_errors_are_classified() {
        assert!(ScribeError::EmptyDocument.is_load_error());
        assert!(!ScribeError::Cancelled.is_load_error());
        assert!(!ScribeError::NotLoaded.is_load_error());
        assert!(!ScribeError::AlreadyFinished.is_load_error());
    }
}
