//! OCR service: submit a document (or some of its pages) and get Markdown back.
//!
//! This module is intentionally thin. [`OcrService`] is the seam the
//! conversion routine talks to; [`MistralOcr`] is the production
//! implementation over the Mistral REST API. The page-splitting recovery in
//! [`crate::convert`] only sees `Result<Vec<OcrPage>, Arxiv2MdError>` and does
//! not care which backend produced it.
//!
//! ## Request flow for a local PDF
//!
//! ```text
//! upload (POST /files, purpose=ocr)  ─▶ file id          (once per attempt)
//! signed URL (GET /files/{id}/url)   ─▶ document_url     (per OCR call)
//! OCR (POST /ocr {model, document, pages})  ─▶ pages[].markdown
//! ```

use crate::config::BridgeConfig;
use crate::error::Arxiv2MdError;
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// What the OCR service should read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrDocument {
    /// A publicly reachable PDF URL.
    DocumentUrl { url: String },
    /// A file previously uploaded with [`OcrService::upload`].
    UploadedFile { file_id: String },
}

/// One OCR call.
#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub document: OcrDocument,
    /// Zero-indexed pages to process. `None` processes the whole document.
    pub pages: Option<Vec<usize>>,
    /// Per-call timeout.
    pub timeout: Duration,
}

/// Markdown for a single page, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OcrPage {
    /// Zero-indexed page number within the source document.
    pub index: usize,
    pub markdown: String,
}

/// An OCR backend.
pub trait OcrService: Send + Sync {
    /// Upload a local PDF and return a handle usable in later requests.
    fn upload<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<OcrDocument, Arxiv2MdError>>;

    /// Run OCR. Any error (timeout, size limit, service failure) is returned
    /// as-is; callers decide whether to split or give up.
    fn process<'a>(
        &'a self,
        request: &'a OcrRequest,
    ) -> BoxFuture<'a, Result<Vec<OcrPage>, Arxiv2MdError>>;
}

/// Concatenate per-page Markdown in page order, with no separator.
pub fn join_pages(mut pages: Vec<OcrPage>) -> String {
    pages.sort_by_key(|p| p.index);
    let mut out = String::with_capacity(pages.iter().map(|p| p.markdown.len()).sum());
    for page in pages {
        out.push_str(&page.markdown);
    }
    out
}

// ── Mistral ──────────────────────────────────────────────────────────────

/// [`OcrService`] backed by the Mistral OCR API.
#[derive(Clone)]
pub struct MistralOcr {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    upload_timeout: Duration,
}

impl std::fmt::Debug for MistralOcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcr")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("upload_timeout", &self.upload_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OcrBody<'a> {
    model: &'a str,
    document: DocumentChunk<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<&'a [usize]>,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DocumentChunk<'a> {
    DocumentUrl { document_url: &'a str },
}

#[derive(Deserialize)]
struct OcrResponseBody {
    pages: Vec<OcrPage>,
}

#[derive(Deserialize)]
struct UploadedFileBody {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlBody {
    url: String,
}

impl MistralOcr {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        upload_timeout: Duration,
    ) -> Result<Self, Arxiv2MdError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Arxiv2MdError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            upload_timeout,
        })
    }

    /// Build from a [`BridgeConfig`], failing when no API key is configured.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, Arxiv2MdError> {
        let key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Arxiv2MdError::MissingApiKey {
                var: crate::config::API_KEY_VAR.to_string(),
            })?;
        Self::new(
            key,
            &config.ocr_api_base,
            &config.ocr_model,
            Duration::from_secs(config.download_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn upload_file(&self, pdf_path: &Path) -> Result<OcrDocument, Arxiv2MdError> {
        let upload_err = |reason: String| Arxiv2MdError::UploadFailed {
            path: pdf_path.to_path_buf(),
            reason,
        };

        let bytes = tokio::fs::read(pdf_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Arxiv2MdError::FileNotFound {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                upload_err(e.to_string())
            }
        })?;
        let file_name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        info!("Uploading {} ({} bytes) for OCR", pdf_path.display(), bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| upload_err(e.to_string()))?;
        let form = Form::new().text("purpose", "ocr").part("file", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let response = check_status(response).await?;

        let body: UploadedFileBody = response
            .json()
            .await
            .map_err(|e| upload_err(format!("unexpected response: {e}")))?;
        debug!("Uploaded as file id {}", body.id);

        Ok(OcrDocument::UploadedFile { file_id: body.id })
    }

    async fn signed_url(&self, file_id: &str, timeout: Duration) -> Result<String, Arxiv2MdError> {
        let response = self
            .client
            .get(self.url(&format!("files/{file_id}/url")))
            .query(&[("expiry", "24")])
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;
        let response = check_status(response).await?;
        let body: SignedUrlBody = response.json().await.map_err(|e| Arxiv2MdError::OcrFailed {
            message: format!("unexpected signed-URL response: {e}"),
        })?;
        Ok(body.url)
    }

    async fn run_ocr(&self, request: &OcrRequest) -> Result<Vec<OcrPage>, Arxiv2MdError> {
        let document_url = match &request.document {
            OcrDocument::DocumentUrl { url } => url.clone(),
            OcrDocument::UploadedFile { file_id } => {
                self.signed_url(file_id, request.timeout).await?
            }
        };

        let body = OcrBody {
            model: &self.model,
            document: DocumentChunk::DocumentUrl {
                document_url: &document_url,
            },
            pages: request.pages.as_deref(),
            include_image_base64: false,
        };

        debug!(
            "OCR request: model={}, pages={}",
            self.model,
            request
                .pages
                .as_ref()
                .map(|p| p.len().to_string())
                .unwrap_or_else(|| "all".to_string())
        );

        let response = self
            .client
            .post(self.url("ocr"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| send_error(e, request.timeout))?;
        let response = check_status(response).await?;

        let parsed: OcrResponseBody = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Arxiv2MdError::OcrTimeout {
                    secs: request.timeout.as_secs(),
                }
            } else {
                Arxiv2MdError::OcrFailed {
                    message: format!("unexpected OCR response: {e}"),
                }
            }
        })?;
        Ok(parsed.pages)
    }
}

impl OcrService for MistralOcr {
    fn upload<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<OcrDocument, Arxiv2MdError>> {
        Box::pin(self.upload_file(pdf_path))
    }

    fn process<'a>(
        &'a self,
        request: &'a OcrRequest,
    ) -> BoxFuture<'a, Result<Vec<OcrPage>, Arxiv2MdError>> {
        Box::pin(self.run_ocr(request))
    }
}

fn send_error(e: reqwest::Error, timeout: Duration) -> Arxiv2MdError {
    if e.is_timeout() {
        Arxiv2MdError::OcrTimeout {
            secs: timeout.as_secs(),
        }
    } else {
        Arxiv2MdError::OcrFailed {
            message: e.to_string(),
        }
    }
}

/// Map non-2xx responses onto typed errors.
async fn check_status(response: Response) -> Result<Response, Arxiv2MdError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Arxiv2MdError::AuthError {
            detail: format!("HTTP {status}: {}", truncate(&body, 200)),
        },
        StatusCode::TOO_MANY_REQUESTS => Arxiv2MdError::RateLimitExceeded {
            retry_after_secs: retry_after,
        },
        _ => Arxiv2MdError::OcrFailed {
            message: format!("HTTP {status}: {}", truncate(&body, 200)),
        },
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
