//! Schema service
//!
//! Orchestrates the pipeline for one entity:
//!
//! ```text
//! ContentSource ──fetch──▶ SchemaGenerator ──▶ CanonicalLinker ──▶ EndpointRouter ──▶ SchemaCache
//!   (timeout + retry)        (validate)         (canonical URL)      (mapping)          (versioned)
//! ```
//!
//! Regenerations for the same entity are serialized through a per-key async
//! mutex; different entities never wait on each other.

use chrono::SecondsFormat;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{CacheStats, Clock, PutOutcome, SchemaCache, SystemClock};
use crate::canonical::{link_tags, CanonicalLinker};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{ContentEntity, EndpointMapping, EntityKey, SchemaDocument};
use crate::router::{EndpointLayout, EndpointRouter, DEFAULT_SCHEMA_PREFIX};
use crate::schema::SchemaGenerator;
use crate::upstream::{ContentSource, HttpContentSource, NoContentSource, StaticContentSource};
use crate::utils::error::UpstreamError;
use crate::utils::retry::{with_retry_if, RetryConfig};

// ============================================================================
// Options and Outcomes
// ============================================================================

/// Tunables for upstream reads
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Backoff policy for recoverable upstream errors
    pub retry: RetryConfig,

    /// Per-attempt deadline for a content source read
    pub fetch_timeout: Duration,

    /// Fetch unknown entities on first request
    pub lazy_fetch: bool,

    /// Maximum concurrent refreshes while warming
    pub warm_concurrency: usize,

    /// Public base URL of schema endpoints (defaults to the site origin)
    pub schema_base_url: Option<Url>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            fetch_timeout: Duration::from_secs(5),
            lazy_fetch: true,
            warm_concurrency: 8,
            schema_base_url: None,
        }
    }
}

/// Result of a regeneration
#[derive(Debug, Clone, Serialize)]
pub struct RegenerateOutcome {
    pub key: EntityKey,
    pub version: u64,

    #[serde(flatten)]
    pub outcome: PutOutcome,

    /// Current mapping for the entity (absent when a stale write found none)
    pub mapping: Option<EndpointMapping>,
}

/// Result of a refresh from the content source
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Entity fetched and regenerated
    Regenerated {
        outcome: RegenerateOutcome,
        document: Arc<SchemaDocument>,
    },
    /// Content source failed; last cached document served instead
    Fallback {
        document: Arc<SchemaDocument>,
        error: String,
    },
}

impl RefreshOutcome {
    pub fn document(&self) -> &Arc<SchemaDocument> {
        match self {
            Self::Regenerated { document, .. } | Self::Fallback { document, .. } => document,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Per-entity failure in a batch operation
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub key: String,
    pub error: String,
}

/// Summary of a warm or ingest run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub fallbacks: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.fallbacks + self.failures.len()
    }

    fn record_failure(&mut self, key: impl ToString, error: &Error) {
        self.failures.push(BatchFailure {
            key: key.to_string(),
            error: error.to_string(),
        });
    }
}

/// Cross-reference URLs for one entity
#[derive(Debug, Clone, Serialize)]
pub struct LinkSet {
    pub key: EntityKey,
    pub content_url: Url,
    pub schema_url: Url,

    /// `<head>` snippet for the content page
    pub head: String,
}

/// Service statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub mappings: usize,
    pub layout: &'static str,
    pub source: String,
}

// ============================================================================
// Schema Service
// ============================================================================

/// Generates, links, maps and caches schema documents
pub struct SchemaService {
    generator: SchemaGenerator,
    linker: CanonicalLinker,
    site: Url,
    cache: Arc<SchemaCache>,
    router: Arc<EndpointRouter>,
    source: Arc<dyn ContentSource>,
    clock: Arc<dyn Clock>,
    options: ServiceOptions,
    locks: DashMap<EntityKey, Arc<Mutex<()>>>,
}

impl SchemaService {
    /// Create a service for a site origin with default options
    pub fn new(site: Url, layout: EndpointLayout, source: Arc<dyn ContentSource>) -> Self {
        let linker = match &layout {
            EndpointLayout::Centralized { prefix } => CanonicalLinker::new(site.clone(), prefix.clone()),
            EndpointLayout::Parallel { suffix } => {
                CanonicalLinker::new(site.clone(), DEFAULT_SCHEMA_PREFIX).with_schema_suffix(suffix.clone())
            }
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Self {
            generator: SchemaGenerator::new(),
            linker,
            site,
            cache: Arc::new(SchemaCache::new(Arc::clone(&clock))),
            router: Arc::new(EndpointRouter::new(layout)),
            source,
            clock,
            options: ServiceOptions::default(),
            locks: DashMap::new(),
        }
    }

    /// Build a service from loaded configuration
    ///
    /// The content source is the HTTP API when `upstream.base_url` is set,
    /// otherwise the entities file, otherwise none.
    pub fn from_config(config: &Config) -> Result<Self> {
        let site = config.site_url()?;
        let layout = config.endpoint_layout();

        let source: Arc<dyn ContentSource> = if let Some(base_url) = config.upstream_url()? {
            Arc::new(HttpContentSource::with_config(
                base_url,
                config.fetch_timeout(),
                config.upstream.rate_limit,
            )?)
        } else if let Some(path) = &config.upstream.entities_file {
            Arc::new(StaticContentSource::from_file(path)?)
        } else {
            Arc::new(NoContentSource)
        };

        let options = ServiceOptions {
            retry: config.retry_config(),
            fetch_timeout: config.fetch_timeout(),
            lazy_fetch: config.upstream.lazy_fetch,
            warm_concurrency: config.upstream.warm_concurrency,
            schema_base_url: config.schema_base_url()?,
        };

        Ok(Self::new(site, layout, source).with_options(options))
    }

    /// Replace the clock (resets the cache)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = Arc::new(SchemaCache::new(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn router(&self) -> &Arc<EndpointRouter> {
        &self.router
    }

    pub fn linker(&self) -> &CanonicalLinker {
        &self.linker
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Content page URL for an entity: explicit, or derived from the site origin
    pub fn content_url(&self, entity: &ContentEntity) -> String {
        match entity.content_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => self.linker.content_url_for(&entity.key()).to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------------

    /// Generate and link a document without touching the cache or router
    pub fn generate(&self, entity: &ContentEntity) -> Result<SchemaDocument> {
        let document = self.generator.generate(entity, self.clock.now())?;
        let content_url = self.content_url(entity);
        Ok(self.linker.link(document, &content_url)?)
    }

    /// Regenerate an entity's document and commit it
    ///
    /// Versions older than the cached one are skipped without generating.
    #[instrument(skip(self, entity), fields(entity = %entity.key(), version = entity.version))]
    pub async fn regenerate(&self, entity: &ContentEntity) -> Result<RegenerateOutcome> {
        let key = entity.key();
        let type_label = key.entity_type.slug();
        let _timer = metrics::start_regeneration_timer(type_label);

        let lock = self.lock_for(&key);
        let guard = lock.lock().await;

        if let Some(cached_version) = self.cache.cached_version(&key) {
            if entity.version < cached_version {
                debug!(cached_version, "Skipping regeneration of an older version");
                metrics::record_regeneration(type_label, "stale");
                return Ok(RegenerateOutcome {
                    mapping: self.router.mapping(&key),
                    key,
                    version: entity.version,
                    outcome: PutOutcome::Stale { cached_version },
                });
            }
        }

        let result = self.commit(&key, entity);
        let label = match &result {
            Ok(outcome) => outcome.outcome.as_str(),
            Err(e) => failure_label(e),
        };
        metrics::record_regeneration(type_label, label);

        match &result {
            Ok(outcome) => debug!(outcome = outcome.outcome.as_str(), "Regenerated schema document"),
            Err(e) => warn!(error = %e, "Regeneration failed"),
        }

        // A key that never committed keeps no lock entry
        if result.is_err() && !self.router.is_mapped(&key) {
            drop(guard);
            drop(lock);
            self.release_lock(&key);
        }
        result
    }

    fn commit(&self, key: &EntityKey, entity: &ContentEntity) -> Result<RegenerateOutcome> {
        let document = self.generate(entity)?;
        let canonical = document
            .canonical_url
            .clone()
            .ok_or_else(|| Error::other(format!("Document for {key} was not linked")))?;

        let mapping = self.router.register(key, &canonical)?;
        let outcome = self.cache.put(key, entity.version, document)?;

        Ok(RegenerateOutcome {
            key: key.clone(),
            version: entity.version,
            outcome,
            mapping: Some(mapping),
        })
    }

    // ------------------------------------------------------------------------
    // Upstream
    // ------------------------------------------------------------------------

    /// Fetch an entity with per-attempt timeout and retry on recoverable errors
    async fn fetch(&self, key: &EntityKey) -> std::result::Result<ContentEntity, UpstreamError> {
        let source = &self.source;
        let timeout = self.options.fetch_timeout;

        let result = with_retry_if(
            &self.options.retry,
            move || async move {
                match tokio::time::timeout(timeout, source.fetch(key)).await {
                    Ok(result) => result,
                    Err(_) => Err(UpstreamError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            },
            UpstreamError::is_recoverable,
        )
        .await;

        if let Err(e) = &result {
            metrics::record_upstream_failure(e.kind());
        }
        result
    }

    /// Re-read an entity from the content source and regenerate it
    ///
    /// When the source keeps failing, the last cached document is served.
    /// An entity the source no longer knows is removed.
    #[instrument(skip(self), fields(entity = %key, source = self.source.name()))]
    pub async fn refresh(&self, key: &EntityKey) -> Result<RefreshOutcome> {
        match self.fetch(key).await {
            Ok(entity) => {
                let outcome = self.regenerate(&entity).await?;
                let document = self
                    .cache
                    .latest(key)
                    .ok_or_else(|| Error::not_found(key.clone()))?;
                Ok(RefreshOutcome::Regenerated { outcome, document })
            }
            Err(UpstreamError::NotFound(missing)) => {
                if self.remove(key).await {
                    info!("Entity no longer exists upstream, removed");
                }
                Err(UpstreamError::NotFound(missing).into())
            }
            Err(e) => match self.cache.latest(key) {
                Some(document) => {
                    warn!(error = %e, version = document.version, "Content source failed, serving last cached document");
                    metrics::record_fallback_served();
                    Ok(RefreshOutcome::Fallback {
                        document,
                        error: e.to_string(),
                    })
                }
                None => Err(e.into()),
            },
        }
    }

    /// Cached document for an entity, fetching on first request when enabled
    pub async fn document(&self, key: &EntityKey) -> Result<Arc<SchemaDocument>> {
        if let Some(document) = self.cache.latest(key) {
            return Ok(document);
        }

        if self.options.lazy_fetch && !self.router.is_mapped(key) {
            return match self.refresh(key).await {
                Ok(refreshed) => Ok(Arc::clone(refreshed.document())),
                Err(Error::Upstream(UpstreamError::Unconfigured | UpstreamError::NotFound(_))) => {
                    Err(Error::not_found(key.clone()))
                }
                Err(e) => Err(e),
            };
        }

        Err(Error::not_found(key.clone()))
    }

    /// Drop an entity's mapping and cached document
    pub async fn remove(&self, key: &EntityKey) -> bool {
        let lock = self.lock_for(key);
        let removed = {
            let _guard = lock.lock().await;
            let evicted = self.cache.invalidate(key).is_some();
            let unmapped = self.router.unregister(key).is_some();
            evicted || unmapped
        };
        drop(lock);
        self.release_lock(key);

        if removed {
            debug!(entity = %key, "Removed entity");
        }
        removed
    }

    /// Refresh many entities with bounded concurrency
    pub async fn warm(&self, keys: Vec<EntityKey>) -> BatchReport {
        let concurrency = self.options.warm_concurrency.max(1);
        let results: Vec<_> = stream::iter(keys)
            .map(|key| async move {
                let result = self.refresh(&key).await;
                (key, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (key, result) in results {
            match result {
                Ok(RefreshOutcome::Regenerated { .. }) => report.succeeded += 1,
                Ok(RefreshOutcome::Fallback { .. }) => report.fallbacks += 1,
                Err(e) => report.record_failure(&key, &e),
            }
        }

        info!(
            succeeded = report.succeeded,
            fallbacks = report.fallbacks,
            failed = report.failures.len(),
            "Warm-up complete"
        );
        report
    }

    /// Regenerate a batch of pushed entities in order
    pub async fn ingest(&self, entities: &[ContentEntity]) -> BatchReport {
        let mut report = BatchReport::default();
        for entity in entities {
            match self.regenerate(entity).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => report.record_failure(format!("{}/{}", entity.entity_type.slug(), entity.id), &e),
            }
        }
        report
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    /// Absolute URL of a schema endpoint path
    pub fn schema_url(&self, schema_path: &str) -> Result<Url> {
        let base = self.options.schema_base_url.as_ref().unwrap_or(&self.site);
        base.join(schema_path)
            .map_err(|e| Error::with_source(format!("Invalid schema path '{schema_path}'"), e))
    }

    /// Canonical and alternate links for a mapped entity
    pub fn links(&self, key: &EntityKey) -> Result<LinkSet> {
        let mapping = self
            .router
            .mapping(key)
            .ok_or_else(|| Error::not_found(key.clone()))?;
        let schema_url = self.schema_url(&mapping.schema_path)?;
        let head = link_tags(&mapping.content_url, &schema_url);

        Ok(LinkSet {
            key: mapping.key,
            content_url: mapping.content_url,
            schema_url,
            head,
        })
    }

    /// Sitemap of content pages; schema endpoints are never listed
    pub fn sitemap(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );

        for mapping in self.router.mappings() {
            if self.linker.is_schema_path(mapping.content_path()) {
                continue;
            }
            let _ = write!(
                xml,
                "  <url>\n    <loc>{}</loc>\n",
                html_escape::encode_text(mapping.content_url.as_str())
            );
            if let Some(entry) = self.cache.entry(&mapping.key) {
                let _ = write!(
                    xml,
                    "    <lastmod>{}</lastmod>\n",
                    entry.stored_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
            xml.push_str("  </url>\n");
        }

        xml.push_str("</urlset>\n");
        xml
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            mappings: self.router.len(),
            layout: self.router.layout().name(),
            source: self.source.name().to_string(),
        }
    }

    fn lock_for(&self, key: &EntityKey) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    /// Drop a key's lock entry unless another task still holds it
    fn release_lock(&self, key: &EntityKey) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for SchemaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaService")
            .field("site", &self.site.as_str())
            .field("layout", &self.router.layout().name())
            .field("source", &self.source.name())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

fn failure_label(error: &Error) -> &'static str {
    match error {
        Error::Validation(_) => "invalid",
        Error::CanonicalMismatch(_) => "mismatch",
        Error::MappingConflict { .. } => "conflict",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::models::EntityType;
    use chrono::{TimeZone, Utc};

    fn site() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    fn course(id: &str, version: u64) -> ContentEntity {
        ContentEntity::new(EntityType::Course, id, version)
            .with_field("name", format!("Course {id} v{version}"))
            .with_field("description", "An introduction")
    }

    fn service(source: Arc<dyn ContentSource>) -> SchemaService {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        SchemaService::new(site(), EndpointLayout::default(), source)
            .with_clock(clock)
            .with_options(ServiceOptions {
                retry: RetryConfig::with_delays(2, 1, 5),
                fetch_timeout: Duration::from_millis(200),
                ..Default::default()
            })
    }

    #[test]
    fn test_generate_links_derived_url() {
        let svc = service(Arc::new(NoContentSource));
        let doc = svc.generate(&course("course-1", 2)).unwrap();
        assert_eq!(
            doc.canonical_url.unwrap().as_str(),
            "https://example.com/courses/course-1"
        );
        assert_eq!(doc.body["@type"], "Course");
    }

    #[test]
    fn test_generate_uses_explicit_content_url() {
        let svc = service(Arc::new(NoContentSource));
        let entity = course("course-1", 1).with_content_url("https://example.com/learn/rust");
        let doc = svc.generate(&entity).unwrap();
        assert_eq!(doc.canonical_url.unwrap().path(), "/learn/rust");
    }

    #[tokio::test]
    async fn test_regenerate_registers_and_caches() {
        let svc = service(Arc::new(NoContentSource));
        let outcome = svc.regenerate(&course("c1", 1)).await.unwrap();

        assert_eq!(outcome.outcome, PutOutcome::Inserted);
        assert_eq!(outcome.mapping.unwrap().schema_path, "/schema/course/c1");
        assert!(svc.cache().get(&outcome.key, 1).is_some());
    }

    #[tokio::test]
    async fn test_regenerate_skips_older_version() {
        let svc = service(Arc::new(NoContentSource));
        svc.regenerate(&course("c1", 3)).await.unwrap();
        let outcome = svc.regenerate(&course("c1", 2)).await.unwrap();

        assert_eq!(outcome.outcome, PutOutcome::Stale { cached_version: 3 });
        assert_eq!(svc.cache().latest(&outcome.key).unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_canonical_mismatch_caches_nothing() {
        let svc = service(Arc::new(NoContentSource));
        let entity = course("c1", 1).with_content_url("https://elsewhere.example/courses/c1");

        let err = svc.regenerate(&entity).await.unwrap_err();
        assert!(matches!(err, Error::CanonicalMismatch(_)));
        assert!(svc.cache().is_empty());
        assert!(svc.router().is_empty());
    }

    #[tokio::test]
    async fn test_remove_drops_mapping_and_document() {
        let svc = service(Arc::new(NoContentSource));
        let key = svc.regenerate(&course("c1", 1)).await.unwrap().key;

        assert!(svc.remove(&key).await);
        assert!(!svc.remove(&key).await);
        assert!(svc.links(&key).is_err());
        assert!(svc.locks.is_empty());
    }

    #[tokio::test]
    async fn test_document_lazy_fetch() {
        let source = Arc::new(StaticContentSource::from_entities([course("c1", 4)]));
        let svc = service(source);
        let key = EntityKey::new(EntityType::Course, "c1");

        let doc = svc.document(&key).await.unwrap();
        assert_eq!(doc.version, 4);

        let missing = EntityKey::new(EntityType::Course, "nope");
        assert!(matches!(svc.document(&missing).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_document_without_lazy_fetch() {
        let source = Arc::new(StaticContentSource::from_entities([course("c1", 4)]));
        let svc = service(source).with_options(ServiceOptions {
            lazy_fetch: false,
            ..Default::default()
        });
        let key = EntityKey::new(EntityType::Course, "c1");
        assert!(matches!(svc.document(&key).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_links_and_sitemap() {
        let svc = service(Arc::new(NoContentSource));
        let key = svc.regenerate(&course("c1", 1)).await.unwrap().key;

        let links = svc.links(&key).unwrap();
        assert_eq!(links.schema_url.as_str(), "https://example.com/schema/course/c1");
        assert!(links.head.contains("rel=\"canonical\" href=\"https://example.com/courses/c1\""));

        let sitemap = svc.sitemap();
        assert!(sitemap.contains("<loc>https://example.com/courses/c1</loc>"));
        assert!(sitemap.contains("<lastmod>2024-05-01T09:00:00Z</lastmod>"));
        assert!(!sitemap.contains("/schema/"));
    }

    #[tokio::test]
    async fn test_ingest_reports_failures() {
        let svc = service(Arc::new(NoContentSource));
        let invalid = ContentEntity::new(EntityType::Product, "p1", 1);
        let report = svc.ingest(&[course("c1", 1), invalid]).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "product/p1");
        assert_eq!(report.total(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_regeneration_keeps_no_lock() {
        let svc = service(Arc::new(NoContentSource));

        let invalid = ContentEntity::new(EntityType::Product, "p1", 1);
        assert!(svc.regenerate(&invalid).await.is_err());

        let foreign = course("c1", 1).with_content_url("https://elsewhere.org/courses/c1");
        assert!(svc.regenerate(&foreign).await.is_err());
        assert!(svc.locks.is_empty());

        // A committed key keeps its lock through later failures
        svc.regenerate(&course("c2", 1)).await.unwrap();
        let broken = ContentEntity::new(EntityType::Course, "c2", 2);
        assert!(svc.regenerate(&broken).await.is_err());
        assert_eq!(svc.locks.len(), 1);
    }
}
