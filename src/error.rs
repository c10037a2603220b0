//! Error type for the arxiv2md library.
//!
//! A single enum, [`Arxiv2MdError`], covers every failure the bridge can
//! surface. Variants are grouped by the stage that produces them so callers
//! can match on the stage (resolution, fetch, OCR, configuration) without
//! string inspection.
//!
//! There is no partial-success type: a tool call either yields the whole
//! Markdown document or one of these errors. Transient OCR failures are
//! absorbed by page splitting and the backoff wrapper first; what reaches the
//! caller is the error that remained once both were exhausted.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the arxiv2md library.
#[derive(Debug, Error)]
pub enum Arxiv2MdError {
    // ── Resolution errors ─────────────────────────────────────────────────
    /// The arXiv search returned no record for the identifier.
    #[error("No arXiv paper found for id '{paper_id}'")]
    PaperNotFound { paper_id: String },

    /// The arXiv export API could not be queried.
    #[error("arXiv search failed: {reason}")]
    SearchFailed { reason: String },

    /// The arXiv export API answered with a feed we could not parse.
    #[error("Malformed arXiv Atom feed: {detail}")]
    MalformedFeed { detail: String },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The input string is not a usable HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The downloaded or local file is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A local PDF was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF parsed but has no pages to convert.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR service rejected or failed the request. Usually transient.
    #[error("OCR request failed: {message}")]
    OcrFailed { message: String },

    /// The OCR call exceeded its per-request timeout.
    #[error("OCR request timed out after {secs}s")]
    OcrTimeout { secs: u64 },

    /// OCR API returned HTTP 429.
    #[error("OCR rate limit exceeded{}", retry_after_suffix(.retry_after_secs))]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    /// OCR API returned 401/403. Retrying will not help.
    #[error("OCR authentication error: {detail}")]
    AuthError { detail: String },

    /// Uploading the local PDF to the OCR service failed.
    #[error("Failed to upload '{path}' to the OCR service: {reason}")]
    UploadFailed { path: PathBuf, reason: String },

    /// A page range at or below the split floor still failed.
    #[error(
        "Failed to process PDF pages {first}-{last} ({len} pages) and cannot divide further \
(minimum {min_pages} pages): {detail}"
    )]
    UnprocessableRange {
        first: usize,
        last: usize,
        len: usize,
        min_pages: usize,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A required credential is missing from the configuration.
    #[error("Missing required credential: set {var}")]
    MissingApiKey { var: String },

    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A cached Markdown file exists but could not be read.
    #[error("Failed to read cached Markdown '{path}': {source}")]
    CacheReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file (PDF or Markdown).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_after_suffix(secs: &Option<u64>) -> String {
    secs.map(|s| format!(" (retry after {s}s)"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprocessable_range_names_pages_and_floor() {
        let e = Arxiv2MdError::UnprocessableRange {
            first: 12,
            last: 17,
            len: 6,
            min_pages: 10,
            detail: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("12-17"), "got: {msg}");
        assert!(msg.contains("cannot divide further"), "got: {msg}");
        assert!(msg.contains("minimum 10 pages"), "got: {msg}");
    }

    #[test]
    fn rate_limit_display_with_retry() {
        let e = Arxiv2MdError::RateLimitExceeded {
            retry_after_secs: Some(30),
        };
        assert!(e.to_string().contains("retry after 30s"));
    }

    #[test]
    fn rate_limit_display_without_retry() {
        let e = Arxiv2MdError::RateLimitExceeded {
            retry_after_secs: None,
        };
        assert_eq!(e.to_string(), "OCR rate limit exceeded");
    }

    #[test]
    fn missing_key_names_variable() {
        let e = Arxiv2MdError::MissingApiKey {
            var: "MISTRAL_API_KEY".into(),
        };
        assert!(e.to_string().contains("MISTRAL_API_KEY"));
    }

    #[test]
    fn not_found_names_paper() {
        let e = Arxiv2MdError::PaperNotFound {
            paper_id: "2302.14691".into(),
        };
        assert!(e.to_string().contains("2302.14691"));
    }
}
