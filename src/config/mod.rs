//! Configuration management for schemagate
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::router::{EndpointLayout, DEFAULT_PARALLEL_SUFFIX, DEFAULT_SCHEMA_PREFIX};
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site and endpoint layout
    pub site: SiteConfig,

    /// HTTP server configuration
    pub server: HttpConfig,

    /// Content source configuration
    pub upstream: UpstreamConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Which endpoint layout to serve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Centralized,
    Parallel,
}

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Origin of the content site; canonical URLs must live here
    pub origin: String,

    /// Public base URL of this service when it is not served from the origin
    pub schema_base_url: Option<String>,

    /// Endpoint layout
    pub layout: LayoutKind,

    /// Prefix of centralized schema endpoints
    pub schema_prefix: String,

    /// Suffix of parallel schema endpoints
    pub parallel_suffix: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Server bind address
    pub bind_address: String,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

/// Content source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the CMS read API
    pub base_url: Option<String>,

    /// JSON file of entities, used when no base URL is set
    pub entities_file: Option<PathBuf>,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,

    /// Requests per second
    pub rate_limit: u32,

    /// Fetch unknown entities on first request
    pub lazy_fetch: bool,

    /// Maximum concurrent refreshes while warming
    pub warm_concurrency: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: String::from("https://example.com"),
            schema_base_url: None,
            layout: LayoutKind::Centralized,
            schema_prefix: String::from(DEFAULT_SCHEMA_PREFIX),
            parallel_suffix: String::from(DEFAULT_PARALLEL_SUFFIX),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0:8080"),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            base_url: None,
            entities_file: None,
            timeout_ms: 5_000,
            max_retries: retry.max_retries,
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            rate_limit: 20,
            lazy_fetch: true,
            warm_concurrency: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from `SCHEMAGATE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Overlay `SCHEMAGATE_*` environment variables on this configuration
    pub fn apply_env(&mut self) {
        if let Some(origin) = env_string("SCHEMAGATE_ORIGIN") {
            self.site.origin = origin;
        }
        if let Some(base) = env_string("SCHEMAGATE_SCHEMA_BASE_URL") {
            self.site.schema_base_url = Some(base);
        }
        match env_string("SCHEMAGATE_LAYOUT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("parallel") => self.site.layout = LayoutKind::Parallel,
            Some("centralized") => self.site.layout = LayoutKind::Centralized,
            _ => {}
        }
        if let Some(prefix) = env_string("SCHEMAGATE_SCHEMA_PREFIX") {
            self.site.schema_prefix = prefix;
        }
        if let Some(suffix) = env_string("SCHEMAGATE_PARALLEL_SUFFIX") {
            self.site.parallel_suffix = suffix;
        }

        if let Some(bind) = env_string("SCHEMAGATE_BIND") {
            self.server.bind_address = bind;
        }
        if let Some(cors) = env_parse("SCHEMAGATE_ENABLE_CORS") {
            self.server.enable_cors = cors;
        }

        if let Some(url) = env_string("SCHEMAGATE_UPSTREAM_URL") {
            self.upstream.base_url = Some(url);
        }
        if let Some(path) = env_string("SCHEMAGATE_ENTITIES_FILE") {
            self.upstream.entities_file = Some(PathBuf::from(path));
        }
        if let Some(timeout) = env_parse("SCHEMAGATE_UPSTREAM_TIMEOUT_MS") {
            self.upstream.timeout_ms = timeout;
        }
        if let Some(retries) = env_parse("SCHEMAGATE_MAX_RETRIES") {
            self.upstream.max_retries = retries;
        }
        if let Some(rate) = env_parse("SCHEMAGATE_RATE_LIMIT") {
            self.upstream.rate_limit = rate;
        }
        if let Some(lazy) = env_parse("SCHEMAGATE_LAZY_FETCH") {
            self.upstream.lazy_fetch = lazy;
        }

        if let Some(level) = env_string("SCHEMAGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_string("SCHEMAGATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let site = self.site_url()?;
        if site.path() != "/" || site.query().is_some() {
            anyhow::bail!("site.origin must be an origin without path or query: {}", self.site.origin);
        }
        self.schema_base_url()?;

        if !self.site.schema_prefix.starts_with('/') || self.site.schema_prefix.trim_matches('/').is_empty() {
            anyhow::bail!("site.schema_prefix must be an absolute, non-root path");
        }
        if !self.site.parallel_suffix.starts_with('/') || self.site.parallel_suffix.len() < 2 {
            anyhow::bail!("site.parallel_suffix must start with '/'");
        }

        self.bind_address()?;
        self.upstream_url()?;

        if self.upstream.timeout_ms == 0 {
            anyhow::bail!("upstream.timeout_ms must be greater than 0");
        }
        if self.upstream.rate_limit == 0 {
            anyhow::bail!("upstream.rate_limit must be greater than 0");
        }
        if self.upstream.warm_concurrency == 0 {
            anyhow::bail!("upstream.warm_concurrency must be greater than 0");
        }
        if self.upstream.base_delay_ms > self.upstream.max_delay_ms {
            anyhow::bail!("upstream.base_delay_ms must not exceed upstream.max_delay_ms");
        }

        Ok(())
    }

    /// Parsed site origin
    pub fn site_url(&self) -> Result<Url> {
        parse_http_url("site.origin", &self.site.origin)
    }

    /// Parsed public base URL of schema endpoints
    pub fn schema_base_url(&self) -> Result<Option<Url>> {
        self.site
            .schema_base_url
            .as_deref()
            .map(|url| parse_http_url("site.schema_base_url", url))
            .transpose()
    }

    /// Parsed content source base URL
    pub fn upstream_url(&self) -> Result<Option<Url>> {
        self.upstream
            .base_url
            .as_deref()
            .map(|url| parse_http_url("upstream.base_url", url))
            .transpose()
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server
            .bind_address
            .parse()
            .with_context(|| format!("Invalid server.bind_address: {}", self.server.bind_address))
    }

    /// Endpoint layout described by the site section
    pub fn endpoint_layout(&self) -> EndpointLayout {
        match self.site.layout {
            LayoutKind::Centralized => EndpointLayout::Centralized {
                prefix: self.site.schema_prefix.clone(),
            },
            LayoutKind::Parallel => EndpointLayout::Parallel {
                suffix: self.site.parallel_suffix.clone(),
            },
        }
    }

    /// Backoff policy for content source reads
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.upstream.max_retries,
            self.upstream.base_delay_ms,
            self.upstream.max_delay_ms,
        )
    }

    /// Get upstream timeout as Duration
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }
}

fn parse_http_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value.trim()).with_context(|| format!("Invalid {field}: {value}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        anyhow::bail!("{field} must be an http(s) URL with a host: {value}");
    }
    Ok(url)
}
