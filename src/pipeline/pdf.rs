//! PDF page counting.
//!
//! The conversion routine needs the total page count up front to build the
//! default full-document [`PageRange`](crate::pipeline::pages::PageRange) and
//! to recognise the top-level call. Counting is behind the [`PageCounter`]
//! trait so tests and alternative backends can supply it without pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while parsing. Loading the document on the blocking pool
//! keeps the Tokio worker threads free.

use crate::error::Arxiv2MdError;
use futures::future::BoxFuture;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns the number of pages in a local PDF.
pub trait PageCounter: Send + Sync {
    fn page_count<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<usize, Arxiv2MdError>>;
}

/// [`PageCounter`] backed by pdfium.
///
/// Binds `library_path` when given, otherwise the system libpdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumPageCounter {
    library_path: Option<PathBuf>,
}

impl PdfiumPageCounter {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, Arxiv2MdError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Arxiv2MdError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    fn count_blocking(&self, pdf_path: &Path) -> Result<usize, Arxiv2MdError> {
        if !pdf_path.exists() {
            return Err(Arxiv2MdError::FileNotFound {
                path: pdf_path.to_path_buf(),
            });
        }

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| Arxiv2MdError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

        let count = document.pages().len() as usize;
        debug!("{}: {} pages", pdf_path.display(), count);
        Ok(count)
    }
}

impl PageCounter for PdfiumPageCounter {
    fn page_count<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<usize, Arxiv2MdError>> {
        Box::pin(async move {
            let counter = self.clone();
            let path = pdf_path.to_path_buf();
            tokio::task::spawn_blocking(move || counter.count_blocking(&path))
                .await
                .map_err(|e| Arxiv2MdError::Internal(format!("Page-count task panicked: {e}")))?
        })
    }
}

/// [`PageCounter`] that always reports the same count.
///
/// Useful when the page count is already known (e.g. from a previous OCR
/// run or document metadata) and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPageCounter(pub usize);

impl PageCounter for FixedPageCounter {
    fn page_count<'a>(&'a self, _pdf_path: &'a Path) -> BoxFuture<'a, Result<usize, Arxiv2MdError>> {
        Box::pin(async move { Ok(self.0) })
    }
}
