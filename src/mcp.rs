//! MCP (Model Context Protocol) tool server.
//!
//! Publishes two tools backed by a shared [`Bridge`]:
//!
//! | Tool           | Parameters  | Returns                          |
//! |----------------|-------------|----------------------------------|
//! | `resolve_url`  | `paper_id`  | PDF URL, or an error result      |
//! | `get_markdown` | `url`       | Markdown text of the paper       |
//!
//! Failures are reported as tool results with `is_error = true` rather than
//! protocol errors, so the calling agent sees the message.
//!
//! Served over stdio (default) or streamable HTTP at `http://<host>:<port>/mcp`.

use std::sync::Arc;

use rmcp::{
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    },
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use tracing::info;

use crate::bridge::Bridge;
use crate::config::{BridgeConfig, Transport};
use crate::error::Arxiv2MdError;

// ─── Parameter Structs ───────────────────────────────────────────────────────

#[derive(serde::Deserialize, schemars::JsonSchema)]
pub struct ResolveUrlParams {
    /// arXiv identifier, e.g. "2302.14691" or "2302.14691v2"
    pub paper_id: String,
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
pub struct GetMarkdownParams {
    /// URL of the paper PDF, e.g. "https://arxiv.org/pdf/2302.14691"
    pub url: String,
}

// ─── Tools ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ArxivTools {
    tool_router: ToolRouter<Self>,
    bridge: Arc<Bridge>,
}

impl ArxivTools {
    fn tool_error(msg: impl Into<String>) -> CallToolResult {
        let mut result = CallToolResult::success(vec![Content::text(msg.into())]);
        result.is_error = Some(true);
        result
    }

    fn tool_ok(text: impl Into<String>) -> CallToolResult {
        CallToolResult::success(vec![Content::text(text.into())])
    }
}

#[tool_router]
impl ArxivTools {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            bridge,
        }
    }

    #[tool(description = "Resolve an arXiv paper id to the URL of its PDF (most recent version).")]
    async fn resolve_url(
        &self,
        Parameters(p): Parameters<ResolveUrlParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.bridge.resolve_url(&p.paper_id).await {
            Ok(Some(url)) => Ok(Self::tool_ok(url)),
            Ok(None) => Ok(Self::tool_error(
                Arxiv2MdError::PaperNotFound {
                    paper_id: p.paper_id.clone(),
                }
                .to_string(),
            )),
            Err(e) => Ok(Self::tool_error(format!("Resolve failed: {e}"))),
        }
    }

    #[tool(description = "Get the full text of a paper PDF as Markdown. Downloads and OCRs the PDF on first use; later calls are served from the local cache.")]
    async fn get_markdown(
        &self,
        Parameters(p): Parameters<GetMarkdownParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.bridge.get_markdown(&p.url).await {
            Ok(markdown) => Ok(Self::tool_ok(markdown)),
            Err(e) => Ok(Self::tool_error(format!("Conversion failed: {e}"))),
        }
    }
}

#[tool_handler]
impl ServerHandler for ArxivTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "arXiv paper tools. Use resolve_url to turn a paper id into a PDF URL, \
                 then get_markdown to read the paper as Markdown."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

// ─── Entry Point ─────────────────────────────────────────────────────────────

/// Serve the tools on the transport named in `config` until the client
/// disconnects (stdio) or the process is stopped (HTTP).
pub async fn serve(bridge: Arc<Bridge>, config: &BridgeConfig) -> Result<(), Arxiv2MdError> {
    let tools = ArxivTools::new(bridge);

    match config.transport {
        Transport::Stdio => {
            info!("Serving MCP tools on stdio");
            let service = tools
                .serve(stdio())
                .await
                .map_err(|e| Arxiv2MdError::Internal(format!("MCP server error: {e}")))?;
            service
                .waiting()
                .await
                .map_err(|e| Arxiv2MdError::Internal(format!("MCP server terminated: {e}")))?;
        }
        Transport::Http => {
            let service = StreamableHttpService::new(
                move || Ok(tools.clone()),
                LocalSessionManager::default().into(),
                Default::default(),
            );
            let router = axum::Router::new().nest_service("/mcp", service);

            let addr = format!("{}:{}", config.host, config.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| Arxiv2MdError::InvalidConfig(format!("cannot bind {addr}: {e}")))?;
            info!("Serving MCP tools on http://{addr}/mcp");

            axum::serve(listener, router)
                .await
                .map_err(|e| Arxiv2MdError::Internal(format!("HTTP server error: {e}")))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::{OcrDocument, OcrPage, OcrRequest, OcrService};
    use crate::pipeline::pdf::FixedPageCounter;
    use futures::future::BoxFuture;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct NoOcr;

    impl OcrService for NoOcr {
        fn upload<'a>(&'a self, p: &'a Path) -> BoxFuture<'a, Result<OcrDocument, Arxiv2MdError>> {
            Box::pin(async move {
                Err(Arxiv2MdError::UploadFailed {
                    path: p.to_path_buf(),
                    reason: "offline".into(),
                })
            })
        }

        fn process<'a>(
            &'a self,
            _r: &'a OcrRequest,
        ) -> BoxFuture<'a, Result<Vec<OcrPage>, Arxiv2MdError>> {
            Box::pin(async { Err(Arxiv2MdError::OcrFailed { message: "offline".into() }) })
        }
    }

    fn tools(dir: &Path) -> ArxivTools {
        tools_with_arxiv(dir, crate::config::DEFAULT_ARXIV_API_BASE)
    }

    fn tools_with_arxiv(dir: &Path, arxiv_api_base: &str) -> ArxivTools {
        let config = BridgeConfig::builder()
            .paper_dir(dir)
            .arxiv_api_base(arxiv_api_base)
            .build()
            .unwrap();
        let bridge =
            Bridge::with_services(config, Arc::new(NoOcr), Arc::new(FixedPageCounter(1))).unwrap();
        ArxivTools::new(Arc::new(bridge))
    }

    fn text_of(result: &CallToolResult) -> String {
        let json = serde_json::to_value(result).unwrap();
        json["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn both_tools_are_registered() {
        let dir = tempfile::tempdir().unwrap();
        let t = tools(dir.path());
        let mut names: Vec<String> = t
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["get_markdown", "resolve_url"]);
    }

    #[tokio::test]
    async fn get_markdown_serves_cache() {
        let dir = tempfile::tempdir().unwrap();
        let t = tools(dir.path());
        t.bridge
            .cache()
            .write("2302.14691", "# Cached paper")
            .await
            .unwrap();

        let result = t
            .get_markdown(Parameters(GetMarkdownParams {
                url: "https://arxiv.org/pdf/2302.14691".into(),
            }))
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        assert_eq!(text_of(&result), "# Cached paper");
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let dir = tempfile::tempdir().unwrap();
        let t = tools(dir.path());
        let result = t
            .get_markdown(Parameters(GetMarkdownParams {
                url: "not a url".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("not a url"));

        let result = t
            .resolve_url(Parameters(ResolveUrlParams {
                paper_id: "   ".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn unknown_paper_reports_not_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let t = tools_with_arxiv(dir.path(), &format!("http://{addr}/api/query"));
        let result = t
            .resolve_url(Parameters(ResolveUrlParams {
                paper_id: "0000.00000".into(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let expected = Arxiv2MdError::PaperNotFound {
            paper_id: "0000.00000".into(),
        };
        assert_eq!(text_of(&result), expected.to_string());
    }
}
