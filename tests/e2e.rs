//! End-to-end tests against the live arXiv and Mistral APIs.
//!
//! Gated behind `E2E_ENABLED` so they never run in CI by accident. The
//! conversion tests also need `MISTRAL_API_KEY` and a pdfium library
//! (system-wide or via `PDFIUM_LIB_PATH`).
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use arxiv2md::{Arxiv2MdError, ArxivClient, Bridge, BridgeConfig};
use std::path::PathBuf;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip unless e2e is enabled *and* a Mistral key is available.
macro_rules! e2e_skip_unless_ocr_ready {
    () => {{
        e2e_skip_unless_enabled!();
        match BridgeConfig::from_env() {
            Ok(config) => config,
            Err(Arxiv2MdError::MissingApiKey { var }) => {
                println!("SKIP: {var} not set");
                return;
            }
            Err(e) => panic!("invalid e2e configuration: {e}"),
        }
    }};
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/e2e-papers");
    std::fs::create_dir_all(&d).ok();
    d
}

fn arxiv() -> ArxivClient {
    ArxivClient::new(
        reqwest::Client::new(),
        arxiv2md::config::DEFAULT_ARXIV_API_BASE,
        Duration::from_secs(60),
    )
}

// ── Resolution ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_resolve_known_paper() {
    e2e_skip_unless_enabled!();
    let url = arxiv().resolve_url("1706.03762").await.unwrap();
    let url = url.expect("Attention Is All You Need should resolve");
    println!("resolved: {url}");
    assert!(url.contains("/pdf/1706.03762"), "got {url}");
}

#[tokio::test]
async fn test_resolve_unknown_paper_is_none() {
    e2e_skip_unless_enabled!();
    let url = arxiv().resolve_url("0000.00000").await.unwrap();
    assert_eq!(url, None);
}

// ── Conversion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_markdown_and_cache() {
    let mut config = e2e_skip_unless_ocr_ready!();
    config.paper_dir = output_dir();

    let bridge = Bridge::new(config).unwrap();
    let url = "https://arxiv.org/pdf/2302.14691";

    let md = bridge.get_markdown(url).await.unwrap();
    println!("{} chars", md.len());
    assert!(!md.trim().is_empty());
    assert!(md.contains('#'), "expected at least one heading");

    let cached = bridge.cache().markdown_path("2302.14691");
    assert!(cached.exists(), "missing cache entry {}", cached.display());

    // Second call is a cache hit and returns identical text.
    let again = bridge.get_markdown(url).await.unwrap();
    assert_eq!(again, md);
}

#[tokio::test]
async fn test_resolve_then_convert_abs_url() {
    let mut config = e2e_skip_unless_ocr_ready!();
    config.paper_dir = output_dir();

    let bridge = Bridge::new(config).unwrap();
    let md = bridge
        .get_markdown("https://arxiv.org/abs/1706.03762")
        .await
        .unwrap();
    assert!(md.to_lowercase().contains("attention"));
}
