//! Document references: derive a stable identifier from a URL and download
//! the PDF it points at.
//!
//! Downloads land at a deterministic path, `<pdf_dir>/<identifier>.pdf`, so
//! the OCR upload step and later runs can find them again. The PDF magic
//! bytes (`%PDF`) are checked before anything is written so callers get a
//! meaningful error instead of an opaque OCR failure on an HTML error page.

use crate::error::Arxiv2MdError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Derive the cache identifier for a document URL.
///
/// Takes the last non-empty path segment (query string and fragment are
/// ignored) and strips a trailing `.pdf`. Dots inside the identifier are
/// kept, so `2302.14691.pdf` becomes `2302.14691`.
///
/// ```rust
/// use arxiv2md::pipeline::input::derive_identifier;
///
/// assert_eq!(derive_identifier("https://arxiv.org/pdf/2302.14691").unwrap(), "2302.14691");
/// assert_eq!(derive_identifier("https://arxiv.org/abs/2302.14691").unwrap(), "2302.14691");
/// assert_eq!(derive_identifier("https://arxiv.org/pdf/2302.14691v2.pdf").unwrap(), "2302.14691v2");
/// ```
pub fn derive_identifier(url: &str) -> Result<String, Arxiv2MdError> {
    let invalid = || Arxiv2MdError::InvalidInput {
        input: url.to_string(),
    };

    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| invalid())?;
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .ok_or_else(invalid)?;

    let id = match segment.len().checked_sub(4) {
        Some(cut)
            if segment
                .get(cut..)
                .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf")) =>
        {
            &segment[..cut]
        }
        _ => segment,
    };

    // Identifiers become file names; refuse anything that could escape the
    // cache directory.
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(invalid());
    }
    Ok(id.to_string())
}

/// Rewrite an arXiv abstract-page URL (`/abs/<id>`) to its PDF URL
/// (`/pdf/<id>`). URLs on other hosts are returned unchanged.
pub fn canonical_pdf_url(url: &str) -> String {
    let Ok(mut parsed) = reqwest::Url::parse(url) else {
        return url.to_string();
    };
    let is_arxiv = parsed
        .host_str()
        .is_some_and(|h| h == "arxiv.org" || h.ends_with(".arxiv.org"));
    let pdf_path = parsed
        .path()
        .strip_prefix("/abs/")
        .filter(|_| is_arxiv)
        .map(|rest| format!("/pdf/{rest}"));

    match pdf_path {
        Some(path) => {
            parsed.set_path(&path);
            parsed.to_string()
        }
        None => url.to_string(),
    }
}

/// Download `url` to `<pdf_dir>/<identifier>.pdf` and return the path.
///
/// One plain GET with no retry; failures propagate to the caller. Abstract
/// page URLs are fetched from their PDF counterpart.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    pdf_dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, Arxiv2MdError> {
    let id = derive_identifier(url)?;
    let download_url = canonical_pdf_url(url);
    info!("Downloading PDF from: {}", download_url);

    let response = client
        .get(&download_url)
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Arxiv2MdError::DownloadTimeout {
                    url: download_url.clone(),
                    secs: timeout_secs,
                }
            } else {
                Arxiv2MdError::DownloadFailed {
                    url: download_url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

    if !response.status().is_success() {
        return Err(Arxiv2MdError::DownloadFailed {
            url: download_url,
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Arxiv2MdError::DownloadFailed {
            url: download_url.clone(),
            reason: e.to_string(),
        })?;

    let file_path = pdf_dir.join(format!("{id}.pdf"));

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(Arxiv2MdError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::create_dir_all(pdf_dir)
        .await
        .map_err(|e| Arxiv2MdError::OutputWriteFailed {
            path: pdf_dir.to_path_buf(),
            source: e,
        })?;
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Arxiv2MdError::OutputWriteFailed {
            path: file_path.clone(),
            source: e,
        })?;

    debug!("Wrote {} bytes", bytes.len());
    info!("Downloaded to: {}", file_path.display());
    Ok(file_path)
}
