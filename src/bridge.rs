//! The tool façade: what an agent actually calls.
//!
//! [`Bridge`] owns the configuration, HTTP client, cache layout and
//! [`Converter`], and exposes the two operations the MCP server publishes:
//! [`Bridge::resolve_url`] and [`Bridge::get_markdown`].

use crate::cache::MarkdownCache;
use crate::config::BridgeConfig;
use crate::convert::{ConversionOptions, Converter, DocumentSource};
use crate::error::Arxiv2MdError;
use crate::pipeline::input::{derive_identifier, fetch};
use crate::pipeline::ocr::{MistralOcr, OcrService};
use crate::pipeline::pdf::{PageCounter, PdfiumPageCounter};
use crate::pipeline::postprocess::cleanup_markdown;
use crate::pipeline::resolve::ArxivClient;
use std::sync::Arc;
use tracing::info;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub struct Bridge {
    config: BridgeConfig,
    http: reqwest::Client,
    arxiv: ArxivClient,
    cache: MarkdownCache,
    converter: Converter,
}

impl Bridge {
    /// Production wiring: Mistral OCR and pdfium page counting.
    ///
    /// # Errors
    /// [`Arxiv2MdError::MissingApiKey`] when `config.api_key` is unset.
    pub fn new(config: BridgeConfig) -> Result<Self, Arxiv2MdError> {
        let ocr = Arc::new(MistralOcr::from_config(&config)?);
        let counter = Arc::new(PdfiumPageCounter::new(config.pdfium_lib_path.clone()));
        Self::with_services(config, ocr, counter)
    }

    /// Wire custom OCR and page-count backends.
    pub fn with_services(
        config: BridgeConfig,
        ocr: Arc<dyn OcrService>,
        counter: Arc<dyn PageCounter>,
    ) -> Result<Self, Arxiv2MdError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Arxiv2MdError::Internal(format!("HTTP client: {e}")))?;
        let arxiv = ArxivClient::from_config(http.clone(), &config);
        let cache = MarkdownCache::new(&config.paper_dir);
        let converter = Converter::new(ocr, counter, ConversionOptions::from_config(&config));
        Ok(Self {
            config,
            http,
            arxiv,
            cache,
            converter,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn cache(&self) -> &MarkdownCache {
        &self.cache
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// PDF URL for an arXiv id, or `None` when the catalog has no match.
    pub async fn resolve_url(&self, paper_id: &str) -> Result<Option<String>, Arxiv2MdError> {
        self.arxiv.resolve_url(paper_id).await
    }

    /// Markdown for the PDF at `url`, from the cache when possible.
    ///
    /// On a miss the PDF is downloaded to `<paper_dir>/pdf/<id>.pdf`,
    /// converted with retry and page splitting, cached at
    /// `<paper_dir>/md/<id>.md` and passed through
    /// [`cleanup_markdown`](crate::pipeline::postprocess::cleanup_markdown).
    pub async fn get_markdown(&self, url: &str) -> Result<String, Arxiv2MdError> {
        let id = derive_identifier(url)?;

        if self.config.cache_enabled {
            if let Some(text) = self.cache.read(&id).await? {
                info!("Cache hit for {id}");
                return Ok(text);
            }
        }

        let pdf_path = fetch(
            &self.http,
            url,
            &self.cache.pdf_dir(),
            self.config.download_timeout_secs,
        )
        .await?;

        let markdown_path = self.cache.markdown_path(&id);
        let markdown = self
            .converter
            .convert(&DocumentSource::LocalFile(pdf_path), Some(&markdown_path))
            .await?;

        Ok(cleanup_markdown(markdown))
    }

    /// Synchronous wrapper around [`Bridge::get_markdown`].
    ///
    /// Creates a temporary tokio runtime internally, so it must not be called
    /// from inside an async context.
    pub fn get_markdown_blocking(&self, url: &str) -> Result<String, Arxiv2MdError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Arxiv2MdError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.get_markdown(url))
    }
}
