//! Content sources
//!
//! The content-management system owns entities; this module reads them.
//! - [`HttpContentSource`]: `GET <base>/entities/<slug>/<id>` with a request
//!   timeout and a rate limiter
//! - [`StaticContentSource`]: entities held in memory, optionally loaded from
//!   a JSON file
//!
//! Retries live one level up (see [`crate::service`]), so a source performs a
//! single attempt per call.

use async_trait::async_trait;
use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client, StatusCode,
};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{ContentEntity, EntityKey};
use crate::utils::error::UpstreamError;
use crate::utils::truncate_text;

/// Read access to content entities
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the current state of an entity
    async fn fetch(&self, key: &EntityKey) -> std::result::Result<ContentEntity, UpstreamError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

// ============================================================================
// HTTP Content Source
// ============================================================================

/// Content source backed by the CMS read API
pub struct HttpContentSource {
    client: Client,
    base_url: Url,
    timeout: Duration,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpContentSource {
    /// Create a source with default settings (10s timeout, 20 requests/second)
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Http`] if the HTTP client cannot be created
    pub fn new(base_url: Url) -> std::result::Result<Self, UpstreamError> {
        Self::with_config(base_url, Duration::from_secs(10), 20)
    }

    /// Create a source with a custom timeout and rate limit
    pub fn with_config(
        base_url: Url,
        timeout: Duration,
        requests_per_second: u32,
    ) -> std::result::Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("schemagate/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .default_headers(headers)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            base_url,
            timeout,
            rate_limiter,
        })
    }

    /// URL of an entity on the CMS read API
    pub fn entity_url(&self, key: &EntityKey) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("entities")
                .push(key.entity_type.slug())
                .push(&key.id);
        }
        url
    }

    /// Map a status code to an error
    ///
    /// Retry on 429 and 5xx; 404 means the entity is gone.
    fn status_error(key: &EntityKey, status: StatusCode) -> UpstreamError {
        match status.as_u16() {
            404 | 410 => UpstreamError::NotFound(key.clone()),
            429 => UpstreamError::RateLimit,
            code @ 500..=599 => UpstreamError::Server(code),
            code => UpstreamError::Status(code),
        }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(&self, key: &EntityKey) -> std::result::Result<ContentEntity, UpstreamError> {
        self.rate_limiter.until_ready().await;

        let url = self.entity_url(key);
        tracing::debug!(entity = %key, url = %url, "Fetching entity from content source");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                UpstreamError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(key, status));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                UpstreamError::Http(e)
            }
        })?;

        let entity: ContentEntity = serde_json::from_str(&body).map_err(|e| {
            UpstreamError::Decode(format!("{e} in body {:?}", truncate_text(&body, 120)))
        })?;

        if &entity.key() != key {
            return Err(UpstreamError::WrongEntity {
                requested: key.clone(),
                returned: entity.key(),
            });
        }

        Ok(entity)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Static Content Source
// ============================================================================

/// In-memory content source
#[derive(Debug, Default)]
pub struct StaticContentSource {
    entities: DashMap<EntityKey, ContentEntity>,
}

impl StaticContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = ContentEntity>) -> Self {
        let source = Self::new();
        for entity in entities {
            source.upsert(entity);
        }
        source
    }

    /// Load a JSON array of entities from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let entities = load_entities(path)?;
        Ok(Self::from_entities(entities))
    }

    /// Insert or replace an entity
    pub fn upsert(&self, entity: ContentEntity) {
        self.entities.insert(entity.key(), entity);
    }

    pub fn remove(&self, key: &EntityKey) -> Option<ContentEntity> {
        self.entities.remove(key).map(|(_, entity)| entity)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<_> = self.entities.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch(&self, key: &EntityKey) -> std::result::Result<ContentEntity, UpstreamError> {
        self.entities
            .get(key)
            .map(|entity| entity.clone())
            .ok_or_else(|| UpstreamError::NotFound(key.clone()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Placeholder source used when no CMS is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContentSource;

#[async_trait]
impl ContentSource for NoContentSource {
    async fn fetch(&self, _key: &EntityKey) -> std::result::Result<ContentEntity, UpstreamError> {
        Err(UpstreamError::Unconfigured)
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Read a JSON array (or a single object) of entities
pub fn load_entities(path: &Path) -> Result<Vec<ContentEntity>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::with_source(format!("Failed to read entities file: {}", path.display()), e)
    })?;

    let value: serde_json::Value = serde_json::from_str(&content)?;
    let entities = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(entities)
}
