//! Configuration types for the arXiv-to-Markdown bridge.
//!
//! All runtime behaviour is controlled through [`BridgeConfig`], built once
//! at process start and passed into [`crate::bridge::Bridge`]. Nothing below
//! the binary reads the process environment; [`BridgeConfig::from_env`] is the
//! single place where environment variables become typed settings, and it
//! goes through [`BridgeConfig::from_lookup`] so tests can inject a map.
//!
//! Retry behaviour lives in its own [`RetryPolicy`] so the backoff wrapper in
//! [`crate::retry`] can be used (and tested) without a full bridge config.

use crate::error::Arxiv2MdError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the Mistral API key.
pub const API_KEY_VAR: &str = "MISTRAL_API_KEY";

/// Default split floor: page ranges of this length or shorter are never bisected.
pub const MIN_PAGES: usize = 10;

/// Default Mistral OCR model.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";

/// Default Mistral API base URL.
pub const DEFAULT_OCR_API_BASE: &str = "https://api.mistral.ai/v1";

/// Default arXiv export API endpoint.
pub const DEFAULT_ARXIV_API_BASE: &str = "http://export.arxiv.org/api/query";

// ── Retry policy ─────────────────────────────────────────────────────────

/// Bounded exponential backoff settings for [`crate::retry::retry_with_backoff`].
///
/// `max_retries` counts *attempts*: with `max_retries = 3` the operation runs
/// at most three times and sleeps twice. The delay before attempt `n + 1` is
/// `min(base_delay * exponential_base^(n - 1), max_delay)`, scaled by a
/// uniform factor in `[0.5, 1.0)` when `jitter` is on.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (≥ 1). Default: 5.
    pub max_retries: u32,
    /// Delay after the first failure. Default: 1 s.
    pub base_delay: Duration,
    /// Upper bound on any single delay. Default: 60 s.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays (> 1). Default: 3.0.
    pub exponential_base: f64,
    /// Randomise each delay to spread out concurrent retries. Default: true.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 3.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new builder starting from [`RetryPolicy::default`].
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// The preset applied to the top-level OCR conversion:
    /// 3 attempts, 2 s base, 300 s cap, ×3 growth, jitter on.
    pub fn conversion() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            ..Self::default()
        }
    }

    /// Check the invariants the backoff loop relies on.
    pub fn validate(&self) -> Result<(), Arxiv2MdError> {
        if self.max_retries == 0 {
            return Err(Arxiv2MdError::InvalidConfig(
                "max_retries must be ≥ 1".into(),
            ));
        }
        if self.base_delay.is_zero() {
            return Err(Arxiv2MdError::InvalidConfig(
                "base_delay must be > 0".into(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(Arxiv2MdError::InvalidConfig(format!(
                "max_delay ({:?}) must be ≥ base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        if !self.exponential_base.is_finite() || self.exponential_base <= 1.0 {
            return Err(Arxiv2MdError::InvalidConfig(format!(
                "exponential_base must be a finite number > 1, got {}",
                self.exponential_base
            )));
        }
        Ok(())
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.policy.max_retries = n;
        self
    }

    pub fn base_delay(mut self, d: Duration) -> Self {
        self.policy.base_delay = d;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.policy.max_delay = d;
        self
    }

    pub fn exponential_base(mut self, b: f64) -> Self {
        self.policy.exponential_base = b;
        self
    }

    pub fn jitter(mut self, on: bool) -> Self {
        self.policy.jitter = on;
        self
    }

    /// Build the policy, validating constraints.
    pub fn build(self) -> Result<RetryPolicy, Arxiv2MdError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

// ── Transport ────────────────────────────────────────────────────────────

/// How the MCP tool server talks to its agent runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout (default).
    #[default]
    Stdio,
    /// Streamable HTTP on `host:port`.
    Http,
}

impl FromStr for Transport {
    type Err = Arxiv2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "streamable-http" | "streamable_http" => Ok(Transport::Http),
            other => Err(Arxiv2MdError::InvalidConfig(format!(
                "unknown transport '{other}' (expected stdio or http)"
            ))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => f.write_str("stdio"),
            Transport::Http => f.write_str("http"),
        }
    }
}

// ── Bridge config ────────────────────────────────────────────────────────

/// Configuration for the bridge.
///
/// Built via [`BridgeConfig::builder()`] or [`BridgeConfig::from_env()`].
///
/// # Example
/// ```rust
/// use arxiv2md::BridgeConfig;
///
/// let config = BridgeConfig::builder()
///     .api_key("sk-test")
///     .paper_dir("/tmp/papers")
///     .cache_enabled(false)
///     .build()
///     .unwrap();
/// assert!(!config.cache_enabled);
/// ```
#[derive(Clone)]
pub struct BridgeConfig {
    /// Mistral API key. Required to build the OCR client.
    pub api_key: Option<String>,

    /// Storage root. PDFs go to `<paper_dir>/pdf`, Markdown to `<paper_dir>/md`.
    pub paper_dir: PathBuf,

    /// Return cached Markdown when `<paper_dir>/md/<id>.md` exists. Default: true.
    pub cache_enabled: bool,

    /// OCR model identifier. Default: `mistral-ocr-latest`.
    pub ocr_model: String,

    /// Mistral API base URL (no trailing slash).
    pub ocr_api_base: String,

    /// arXiv export API endpoint.
    pub arxiv_api_base: String,

    /// Per-OCR-call timeout in seconds. Default: 60.
    ///
    /// Applies to each request only. A document that splits several times
    /// can take a multiple of this in total.
    pub ocr_timeout_secs: u64,

    /// Download timeout for PDF fetches and arXiv queries in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Split floor. Ranges with this many pages or fewer fail terminally. Default: 10.
    pub min_split_pages: usize,

    /// Backoff applied around the top-level conversion.
    pub retry: RetryPolicy,

    /// MCP transport. Default: stdio.
    pub transport: Transport,

    /// Bind host for the HTTP transport. Default: 127.0.0.1.
    pub host: String,

    /// Bind port for the HTTP transport. Default: 8000.
    pub port: u16,

    /// Path to libpdfium. When `None` the system library is used.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            paper_dir: PathBuf::from("papers"),
            cache_enabled: true,
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            ocr_api_base: DEFAULT_OCR_API_BASE.to_string(),
            arxiv_api_base: DEFAULT_ARXIV_API_BASE.to_string(),
            ocr_timeout_secs: 60,
            download_timeout_secs: 120,
            min_split_pages: MIN_PAGES,
            retry: RetryPolicy::conversion(),
            transport: Transport::default(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            pdfium_lib_path: None,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("paper_dir", &self.paper_dir)
            .field("cache_enabled", &self.cache_enabled)
            .field("ocr_model", &self.ocr_model)
            .field("ocr_api_base", &self.ocr_api_base)
            .field("arxiv_api_base", &self.arxiv_api_base)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("min_split_pages", &self.min_split_pages)
            .field("retry", &self.retry)
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl BridgeConfig {
    /// Create a new builder for `BridgeConfig`.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Does not read `.env` files; the binary does that with `dotenvy`
    /// before calling this.
    pub fn from_env() -> Result<Self, Arxiv2MdError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// Fails with [`Arxiv2MdError::MissingApiKey`] when `MISTRAL_API_KEY` is
    /// absent or empty, and with [`Arxiv2MdError::InvalidConfig`] when a
    /// value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Arxiv2MdError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get(API_KEY_VAR).ok_or_else(|| Arxiv2MdError::MissingApiKey {
            var: API_KEY_VAR.to_string(),
        })?;

        let mut builder = Self::builder().api_key(api_key);

        if let Some(dir) = get("PAPER_DIR") {
            builder = builder.paper_dir(dir);
        }
        if let Some(v) = get("ARXIV2MD_CACHE") {
            builder = builder.cache_enabled(parse_flag("ARXIV2MD_CACHE", &v)?);
        }
        if let Some(v) = get("MISTRAL_OCR_MODEL") {
            builder = builder.ocr_model(v);
        }
        if let Some(v) = get("MISTRAL_API_BASE") {
            builder = builder.ocr_api_base(v);
        }
        if let Some(v) = get("ARXIV_API_BASE") {
            builder = builder.arxiv_api_base(v);
        }
        if let Some(v) = get("ARXIV2MD_OCR_TIMEOUT") {
            builder = builder.ocr_timeout_secs(parse_num("ARXIV2MD_OCR_TIMEOUT", &v)?);
        }
        if let Some(v) = get("ARXIV2MD_DOWNLOAD_TIMEOUT") {
            builder = builder.download_timeout_secs(parse_num("ARXIV2MD_DOWNLOAD_TIMEOUT", &v)?);
        }
        if let Some(v) = get("ARXIV2MD_MIN_SPLIT_PAGES") {
            builder = builder.min_split_pages(parse_num("ARXIV2MD_MIN_SPLIT_PAGES", &v)?);
        }
        if let Some(v) = get("ARXIV2MD_TRANSPORT") {
            builder = builder.transport(v.parse()?);
        }
        if let Some(v) = get("ARXIV2MD_HOST") {
            builder = builder.host(v);
        }
        if let Some(v) = get("ARXIV2MD_PORT") {
            builder = builder.port(parse_num("ARXIV2MD_PORT", &v)?);
        }
        if let Some(v) = get("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_lib_path(v);
        }

        builder.build()
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, Arxiv2MdError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Arxiv2MdError::InvalidConfig(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, Arxiv2MdError> {
    value.trim().parse().map_err(|_| {
        Arxiv2MdError::InvalidConfig(format!("{key} must be a number, got '{value}'"))
    })
}

/// Builder for [`BridgeConfig`].
#[derive(Debug)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn paper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paper_dir = dir.into();
        self
    }

    pub fn cache_enabled(mut self, v: bool) -> Self {
        self.config.cache_enabled = v;
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn ocr_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.ocr_api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn arxiv_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.arxiv_api_base = base.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn min_split_pages(mut self, n: usize) -> Self {
        self.config.min_split_pages = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The API key is *not* required here; [`crate::pipeline::ocr::MistralOcr`]
    /// checks for it when it is constructed, so a config without a key can
    /// still drive the arXiv lookup or a bridge with an injected OCR service.
    pub fn build(self) -> Result<BridgeConfig, Arxiv2MdError> {
        let c = &self.config;
        if c.min_split_pages == 0 {
            return Err(Arxiv2MdError::InvalidConfig(
                "min_split_pages must be ≥ 1".into(),
            ));
        }
        if c.ocr_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(Arxiv2MdError::InvalidConfig(
                "timeouts must be > 0 seconds".into(),
            ));
        }
        c.retry.validate()?;
        Ok(self.config)
    }
}
