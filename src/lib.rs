//! # arxiv2md
//!
//! Fetch arXiv papers and convert them to Markdown with Mistral OCR, with an
//! on-disk cache so each paper is downloaded and converted once.
//!
//! ## Why this crate?
//!
//! Agents read papers far better as Markdown than as PDF bytes, but OCR
//! services cap how much they will process per request. Long papers time
//! out. This crate submits the whole document first and, on failure, splits
//! the page range in half recursively until every chunk goes through,
//! then stitches the text back together in page order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! arXiv id / PDF URL
//!  │
//!  ├─ 1. Resolve   id -> PDF URL via the arXiv export API
//!  ├─ 2. Cache     <paper_dir>/md/<id>.md exists? return it
//!  ├─ 3. Fetch     download to <paper_dir>/pdf/<id>.pdf
//!  ├─ 4. OCR       upload, then OCR page ranges (split on failure, retry with backoff)
//!  ├─ 5. Cleanup   post-processing hook (pass-through today)
//!  └─ 6. Store     atomic write of <paper_dir>/md/<id>.md
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arxiv2md::{Bridge, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads MISTRAL_API_KEY, PAPER_DIR, ARXIV2MD_CACHE, ...
//!     let bridge = Bridge::new(BridgeConfig::from_env()?)?;
//!     if let Some(url) = bridge.resolve_url("2302.14691").await? {
//!         let markdown = bridge.get_markdown(&url).await?;
//!         println!("{markdown}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mcp`   | via `cli` | MCP tool server ([`mcp::serve`]) over stdio or streamable HTTP |
//! | `cli`   | on      | Enables the `arxiv2md` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! arxiv2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bridge;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod pipeline;
pub mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bridge::Bridge;
pub use cache::MarkdownCache;
pub use config::{BridgeConfig, BridgeConfigBuilder, RetryPolicy, RetryPolicyBuilder, Transport, MIN_PAGES};
pub use convert::{ConversionOptions, Converter, DocumentSource};
pub use error::Arxiv2MdError;
pub use pipeline::input::{canonical_pdf_url, derive_identifier, fetch};
pub use pipeline::ocr::{join_pages, MistralOcr, OcrDocument, OcrPage, OcrRequest, OcrService};
pub use pipeline::pages::PageRange;
pub use pipeline::pdf::{FixedPageCounter, PageCounter, PdfiumPageCounter};
pub use pipeline::postprocess::cleanup_markdown;
pub use pipeline::resolve::ArxivClient;
pub use retry::retry_with_backoff;
