//! Adaptive OCR conversion.
//!
//! ## Why split on failure?
//!
//! The OCR service has a practical ceiling on document size and processing
//! time. Instead of failing outright on a long paper, [`Converter`] submits the
//! whole page range first and, when that fails, bisects the range and
//! converts each half on its own, recursively, until every chunk succeeds or
//! a chunk at or below the split floor still fails.
//!
//! ```text
//! 0-24 ✗ ──▶ 0-11 ✓
//!        └─▶ 12-24 ✓          => text(0-11) ++ text(12-24)
//! ```
//!
//! Splitting never reorders pages, so the halves are concatenated first then
//! second with no resorting. Any failure at the floor aborts the whole
//! conversion; there is no partial result.
//!
//! The outer entry points ([`Converter::convert`], [`Converter::convert_with`])
//! are wrapped in [`retry_with_backoff`]. The recursion itself is not, so a
//! terminal sub-range error restarts the entire document (upload included)
//! on the next attempt.

use crate::cache::{read_markdown, write_atomic};
use crate::config::{BridgeConfig, RetryPolicy, MIN_PAGES};
use crate::error::Arxiv2MdError;
use crate::pipeline::ocr::{join_pages, OcrDocument, OcrRequest, OcrService};
use crate::pipeline::pages::PageRange;
use crate::pipeline::pdf::PageCounter;
use crate::retry::retry_with_backoff;
use futures::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tuning for [`Converter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Ranges of this many pages or fewer are never split.
    pub min_split_pages: usize,
    /// Timeout for each individual OCR call (not the whole conversion).
    pub ocr_timeout: Duration,
    /// Return an existing Markdown file instead of converting.
    pub cache_enabled: bool,
    /// Outer retry policy.
    pub retry: RetryPolicy,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            min_split_pages: MIN_PAGES,
            ocr_timeout: Duration::from_secs(60),
            cache_enabled: true,
            retry: RetryPolicy::conversion(),
        }
    }
}

impl ConversionOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            min_split_pages: config.min_split_pages,
            ocr_timeout: Duration::from_secs(config.ocr_timeout_secs),
            cache_enabled: config.cache_enabled,
            retry: config.retry.clone(),
        }
    }
}

/// What to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A PDF on disk. Uploaded to the OCR service; page count read locally.
    LocalFile(PathBuf),
    /// A publicly reachable PDF URL, passed straight to the OCR service.
    ///
    /// The page count is unknown, so without an explicit range the whole
    /// document is submitted in one call and cannot be split.
    Url(String),
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::LocalFile(p) => write!(f, "{}", p.display()),
            DocumentSource::Url(u) => f.write_str(u),
        }
    }
}

/// Converts PDFs to Markdown through an [`OcrService`], splitting page
/// ranges on failure.
#[derive(Clone)]
pub struct Converter {
    ocr: Arc<dyn OcrService>,
    counter: Arc<dyn PageCounter>,
    options: ConversionOptions,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(
        ocr: Arc<dyn OcrService>,
        counter: Arc<dyn PageCounter>,
        options: ConversionOptions,
    ) -> Self {
        Self {
            ocr,
            counter,
            options,
        }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Convert every page of `source`.
    ///
    /// When `markdown_path` is given it doubles as the cache entry: an
    /// existing file is returned as-is (if caching is enabled), and a fresh
    /// conversion is written there exactly once.
    pub async fn convert(
        &self,
        source: &DocumentSource,
        markdown_path: Option<&Path>,
    ) -> Result<String, Arxiv2MdError> {
        self.convert_with(source, markdown_path, None, None).await
    }

    /// Convert `pages` of `source` (all pages when `None`), optionally reusing
    /// a document already uploaded with [`OcrService::upload`].
    ///
    /// The result is written to `markdown_path` only when the range covers
    /// the whole document.
    pub async fn convert_with(
        &self,
        source: &DocumentSource,
        markdown_path: Option<&Path>,
        pages: Option<PageRange>,
        uploaded: Option<OcrDocument>,
    ) -> Result<String, Arxiv2MdError> {
        let label = format!("Conversion of {source}");
        retry_with_backoff(&self.options.retry, &label, || {
            self.convert_attempt(source, markdown_path, pages.clone(), uploaded.clone())
        })
        .await
    }

    /// One attempt: cache check, submit, split as needed, persist.
    async fn convert_attempt(
        &self,
        source: &DocumentSource,
        markdown_path: Option<&Path>,
        pages: Option<PageRange>,
        uploaded: Option<OcrDocument>,
    ) -> Result<String, Arxiv2MdError> {
        if self.options.cache_enabled {
            if let Some(path) = markdown_path {
                if let Some(text) = read_markdown(path).await? {
                    info!("Using cached Markdown: {}", path.display());
                    return Ok(text);
                }
            }
        }

        let start = Instant::now();
        info!("Starting conversion: {}", source);

        let (markdown, whole_document) = match source {
            DocumentSource::LocalFile(pdf_path) => {
                let total = self.counter.page_count(pdf_path).await?;
                if total == 0 {
                    return Err(Arxiv2MdError::EmptyDocument {
                        path: pdf_path.clone(),
                    });
                }
                info!("PDF has {} pages", total);

                let range = match pages {
                    Some(range) => range,
                    None => PageRange::full(total).ok_or_else(|| Arxiv2MdError::EmptyDocument {
                        path: pdf_path.clone(),
                    })?,
                };
                let whole = range.covers(total);

                let document = match uploaded {
                    Some(doc) => doc,
                    None => self.ocr.upload(pdf_path).await?,
                };
                (self.convert_range(&document, range).await?, whole)
            }
            DocumentSource::Url(url) => {
                let document = uploaded.unwrap_or_else(|| OcrDocument::DocumentUrl { url: url.clone() });
                match pages {
                    Some(range) => (self.convert_range(&document, range).await?, false),
                    None => (self.process_whole(&document).await?, true),
                }
            }
        };

        if whole_document {
            if let Some(path) = markdown_path {
                write_atomic(path, &markdown).await?;
                info!("Saved Markdown to {}", path.display());
            }
        } else if markdown_path.is_some() {
            debug!("Partial range converted; cache entry not written");
        }

        info!(
            "Conversion complete: {} chars in {}ms",
            markdown.len(),
            start.elapsed().as_millis()
        );
        Ok(markdown)
    }

    /// Submit a whole document without a page list.
    async fn process_whole(&self, document: &OcrDocument) -> Result<String, Arxiv2MdError> {
        let request = OcrRequest {
            document: document.clone(),
            pages: None,
            timeout: self.options.ocr_timeout,
        };
        self.ocr.process(&request).await.map(join_pages)
    }

    /// OCR `range`, bisecting on failure while the range is above the floor.
    fn convert_range<'a>(
        &'a self,
        document: &'a OcrDocument,
        range: PageRange,
    ) -> BoxFuture<'a, Result<String, Arxiv2MdError>> {
        Box::pin(async move {
            let request = OcrRequest {
                document: document.clone(),
                pages: Some(range.to_vec()),
                timeout: self.options.ocr_timeout,
            };

            let err = match self.ocr.process(&request).await {
                Ok(pages) => {
                    debug!("Pages {} converted ({} pages)", range, range.len());
                    return Ok(join_pages(pages));
                }
                Err(e) => e,
            };
            warn!("Error processing pages {}: {}", range, err);

            let halves = if range.len() > self.options.min_split_pages {
                range.split()
            } else {
                None
            };
            let Some((first, second)) = halves else {
                return Err(Arxiv2MdError::UnprocessableRange {
                    first: range.first(),
                    last: range.last(),
                    len: range.len(),
                    min_pages: self.options.min_split_pages,
                    detail: err.to_string(),
                });
            };

            info!(
                "Dividing pages {} into two halves: {} ({} pages) and {} ({} pages)",
                range,
                first,
                first.len(),
                second,
                second.len()
            );

            let mut text = self.convert_range(document, first).await?;
            text.push_str(&self.convert_range(document, second).await?);
            Ok(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::OcrPage;
    use crate::pipeline::pdf::FixedPageCounter;
    use std::sync::Mutex;

    /// Fails every request longer than `max_pages`; records page lists.
    struct CeilingOcr {
        max_pages: usize,
        calls: Mutex<Vec<Option<Vec<usize>>>>,
        uploads: Mutex<usize>,
    }

    impl CeilingOcr {
        fn new(max_pages: usize) -> Arc<Self> {
            Arc::new(Self {
                max_pages,
                calls: Mutex::new(Vec::new()),
                uploads: Mutex::new(0),
            })
        }
    }

    impl OcrService for CeilingOcr {
        fn upload<'a>(&'a self, _p: &'a Path) -> BoxFuture<'a, Result<OcrDocument, Arxiv2MdError>> {
            *self.uploads.lock().unwrap() += 1;
            Box::pin(async {
                Ok(OcrDocument::UploadedFile {
                    file_id: "file-1".into(),
                })
            })
        }

        fn process<'a>(
            &'a self,
            request: &'a OcrRequest,
        ) -> BoxFuture<'a, Result<Vec<OcrPage>, Arxiv2MdError>> {
            self.calls.lock().unwrap().push(request.pages.clone());
            let pages = request.pages.clone();
            let max = self.max_pages;
            Box::pin(async move {
                let pages = pages.unwrap_or_else(|| (0..3).collect());
                if pages.len() > max {
                    return Err(Arxiv2MdError::OcrTimeout { secs: 60 });
                }
                Ok(pages
                    .into_iter()
                    .map(|i| OcrPage {
                        index: i,
                        markdown: format!("[{i}]"),
                    })
                    .collect())
            })
        }
    }

    fn options() -> ConversionOptions {
        ConversionOptions {
            retry: RetryPolicy::builder().max_retries(1).build().unwrap(),
            ..Default::default()
        }
    }

    fn expected(n: usize) -> String {
        (0..n).map(|i| format!("[{i}]")).collect()
    }

    #[tokio::test]
    async fn small_document_succeeds_in_one_call() {
        let ocr = CeilingOcr::new(100);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(7)), options());
        let out = conv
            .convert(&DocumentSource::LocalFile("a.pdf".into()), None)
            .await
            .unwrap();
        assert_eq!(out, expected(7));
        assert_eq!(ocr.calls.lock().unwrap().len(), 1);
        assert_eq!(*ocr.uploads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn splits_until_chunks_fit() {
        let ocr = CeilingOcr::new(12);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(48)), options());
        let out = conv
            .convert(&DocumentSource::LocalFile("a.pdf".into()), None)
            .await
            .unwrap();
        assert_eq!(out, expected(48));

        let lens: Vec<usize> = ocr
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.as_ref().unwrap().len())
            .collect();
        // 48 ✗ -> 24 ✗ -> 12 ✓ 12 ✓ -> 24 ✗ -> 12 ✓ 12 ✓
        assert_eq!(lens, vec![48, 24, 12, 12, 24, 12, 12]);
        assert_eq!(*ocr.uploads.lock().unwrap(), 1, "halves reuse the upload");
    }

    #[tokio::test]
    async fn failure_at_floor_names_the_range() {
        let ocr = CeilingOcr::new(0);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(8)), options());
        let err = conv
            .convert(&DocumentSource::LocalFile("a.pdf".into()), None)
            .await
            .unwrap_err();
        match err {
            Arxiv2MdError::UnprocessableRange {
                first, last, len, ..
            } => assert_eq!((first, last, len), (0, 7, 8)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ocr.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_page_document_is_rejected() {
        let ocr = CeilingOcr::new(100);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(0)), options());
        let err = conv
            .convert(&DocumentSource::LocalFile("a.pdf".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Arxiv2MdError::EmptyDocument { .. }), "got: {err}");
        assert!(ocr.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn url_source_without_range_is_submitted_whole() {
        let ocr = CeilingOcr::new(100);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(0)), options());
        let out = conv
            .convert(&DocumentSource::Url("https://arxiv.org/pdf/1".into()), None)
            .await
            .unwrap();
        assert_eq!(out, expected(3));
        assert_eq!(*ocr.calls.lock().unwrap(), vec![None]);
        assert_eq!(*ocr.uploads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_range_does_not_write_cache() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("md").join("x.md");
        let ocr = CeilingOcr::new(100);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(20)), options());

        let range = PageRange::new((5..9).collect()).unwrap();
        let out = conv
            .convert_with(
                &DocumentSource::LocalFile("a.pdf".into()),
                Some(&md),
                Some(range),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, "[5][6][7][8]");
        assert!(!md.exists());
    }

    #[tokio::test]
    async fn preuploaded_handle_skips_upload() {
        let ocr = CeilingOcr::new(100);
        let conv = Converter::new(ocr.clone(), Arc::new(FixedPageCounter(4)), options());
        let handle = OcrDocument::UploadedFile {
            file_id: "existing".into(),
        };
        conv.convert_with(&DocumentSource::LocalFile("a.pdf".into()), None, None, Some(handle))
            .await
            .unwrap();
        assert_eq!(*ocr.uploads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_cache_reconverts() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("x.md");
        std::fs::write(&md, "stale").unwrap();

        let ocr = CeilingOcr::new(100);
        let conv = Converter::new(
            ocr.clone(),
            Arc::new(FixedPageCounter(2)),
            ConversionOptions {
                cache_enabled: false,
                ..options()
            },
        );
        let out = conv
            .convert(&DocumentSource::LocalFile("a.pdf".into()), Some(&md))
            .await
            .unwrap();
        assert_eq!(out, "[0][1]");
        assert_eq!(std::fs::read_to_string(&md).unwrap(), "[0][1]");
    }
}
