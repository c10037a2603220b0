//! CLI binary for arxiv2md.
//!
//! A thin shim over the library crate: loads `.env`, maps flags onto
//! `BridgeConfig`, then runs the MCP server or a one-off command.

use anyhow::{Context, Result};
use arxiv2md::{
    cache::write_atomic, config::DEFAULT_ARXIV_API_BASE, pipeline::input::is_url, Arxiv2MdError,
    ArxivClient, Bridge, BridgeConfig, Transport,
};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the MCP tools over stdio (for an agent runtime)
  arxiv2md serve

  # Serve over streamable HTTP at http://0.0.0.0:8000/mcp
  arxiv2md serve --transport http --host 0.0.0.0 --port 8000

  # Find the PDF URL of a paper
  arxiv2md resolve 2302.14691

  # Convert a paper (id or URL) to Markdown
  arxiv2md convert 2302.14691 -o paper.md
  arxiv2md convert https://arxiv.org/pdf/1706.03762

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY            Mistral API key (required for serve/convert)
  PAPER_DIR                  Storage root for pdf/ and md/ (default: papers)
  ARXIV2MD_CACHE             Serve cached Markdown when present (default: true)
  MISTRAL_OCR_MODEL          OCR model (default: mistral-ocr-latest)
  MISTRAL_API_BASE           Mistral API base URL
  ARXIV_API_BASE             arXiv export API endpoint
  ARXIV2MD_OCR_TIMEOUT       Per-OCR-call timeout, seconds (default: 60)
  ARXIV2MD_DOWNLOAD_TIMEOUT  Download timeout, seconds (default: 120)
  ARXIV2MD_MIN_SPLIT_PAGES   Never split ranges at or below this size (default: 10)
  ARXIV2MD_TRANSPORT         stdio or http (default: stdio)
  ARXIV2MD_HOST              HTTP bind host (default: 127.0.0.1)
  ARXIV2MD_PORT              HTTP bind port (default: 8000)
  PDFIUM_LIB_PATH            Path to libpdfium (default: system library)

A .env file in the working directory is loaded first.
"#;

/// Fetch arXiv papers as Markdown via Mistral OCR.
#[derive(Parser, Debug)]
#[command(
    name = "arxiv2md",
    version,
    about = "Fetch arXiv papers as Markdown via Mistral OCR, as a CLI or MCP tool server",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Storage root for downloaded PDFs and cached Markdown.
    #[arg(long, global = true, env = "PAPER_DIR")]
    paper_dir: Option<PathBuf>,

    /// Always re-convert, ignoring cached Markdown.
    #[arg(long, global = true)]
    no_cache: bool,

    /// Per-OCR-call timeout in seconds.
    #[arg(long, global = true, env = "ARXIV2MD_OCR_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    ocr_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "ARXIV2MD_DOWNLOAD_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    download_timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "ARXIV2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "ARXIV2MD_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP tool server (resolve_url, get_markdown).
    Serve {
        /// stdio or http.
        #[arg(long, env = "ARXIV2MD_TRANSPORT")]
        transport: Option<Transport>,

        /// Bind host for the HTTP transport.
        #[arg(long, env = "ARXIV2MD_HOST")]
        host: Option<String>,

        /// Bind port for the HTTP transport.
        #[arg(long, env = "ARXIV2MD_PORT")]
        port: Option<u16>,
    },

    /// Print the PDF URL for an arXiv id.
    Resolve {
        /// arXiv identifier, e.g. 2302.14691
        paper_id: String,

        /// arXiv export API endpoint.
        #[arg(long, env = "ARXIV_API_BASE", default_value = DEFAULT_ARXIV_API_BASE)]
        api_base: String,
    },

    /// Convert a paper to Markdown.
    Convert {
        /// arXiv identifier or PDF URL.
        input: String,

        /// Write Markdown to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; real env vars still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Always stderr: in stdio mode stdout carries the MCP protocol.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Serve {
            transport,
            host,
            port,
        } => {
            let mut config = build_config(&cli)?;
            if let Some(t) = transport {
                config.transport = *t;
            }
            if let Some(h) = host {
                config.host = h.clone();
            }
            if let Some(p) = port {
                config.port = *p;
            }
            let bridge = Arc::new(Bridge::new(config.clone()).context("Failed to start bridge")?);
            arxiv2md::mcp::serve(bridge, &config)
                .await
                .context("MCP server failed")?;
        }

        Command::Resolve { paper_id, api_base } => {
            let timeout = Duration::from_secs(cli.download_timeout.unwrap_or(120));
            let client = ArxivClient::new(reqwest_client()?, api_base, timeout);
            match client.resolve_url(paper_id).await.context("Resolve failed")? {
                Some(url) => println!("{url}"),
                None => {
                    return Err(Arxiv2MdError::PaperNotFound {
                        paper_id: paper_id.clone(),
                    }
                    .into())
                }
            }
        }

        Command::Convert { input, output } => {
            let config = build_config(&cli)?;
            let bridge = Bridge::new(config).context("Failed to start bridge")?;

            let url = if is_url(input) {
                input.clone()
            } else {
                bridge
                    .resolve_url(input)
                    .await
                    .context("Resolve failed")?
                    .ok_or_else(|| Arxiv2MdError::PaperNotFound {
                        paper_id: input.clone(),
                    })?
            };

            let markdown = bridge.get_markdown(&url).await.context("Conversion failed")?;

            match output {
                Some(path) => {
                    write_atomic(path, &markdown)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !cli.quiet {
                        eprintln!("✔ {} chars → {}", markdown.len(), path.display());
                    }
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    handle
                        .write_all(markdown.as_bytes())
                        .context("Failed to write to stdout")?;
                    if !markdown.ends_with('\n') {
                        handle.write_all(b"\n").context("Failed to write to stdout")?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Environment first, then CLI flags on top.
fn build_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::from_env().context("Invalid configuration")?;
    if let Some(dir) = &cli.paper_dir {
        config.paper_dir = dir.clone();
    }
    if cli.no_cache {
        config.cache_enabled = false;
    }
    if let Some(secs) = cli.ocr_timeout {
        config.ocr_timeout_secs = secs;
    }
    if let Some(secs) = cli.download_timeout {
        config.download_timeout_secs = secs;
    }
    Ok(config)
}

fn reqwest_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("arxiv2md/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
