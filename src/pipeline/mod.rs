//! Pipeline stages for arXiv-to-Markdown conversion.
//!
//! ## Data Flow
//!
//! ```text
//! resolve ──▶ input ──▶ pdf ──▶ ocr ──▶ postprocess
//! (arXiv API) (download) (count) (Mistral) (cleanup)
//! ```
//!
//! 1. [`resolve`] maps an arXiv id to its PDF URL
//! 2. [`input`] derives the cache identifier and downloads the PDF
//! 3. [`pdf`] counts pages; runs in `spawn_blocking` because pdfium is not
//!    async-safe
//! 4. [`ocr`] is the only stage that talks to the OCR service; [`pages`]
//!    holds the page ranges it is asked to process
//! 5. [`postprocess`] cleans up the Markdown
//!
//! The recursive split-on-failure logic that ties 3 and 4 together lives in
//! [`crate::convert`].

pub mod input;
pub mod ocr;
pub mod pages;
pub mod pdf;
pub mod postprocess;
pub mod resolve;
