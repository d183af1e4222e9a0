//! Versioned in-memory cache for generated schema documents
//!
//! The cache keeps at most one fresh document per entity. Writes are ordered
//! by entity version, never by wall-clock time:
//! - a newer version replaces (and evicts) the older one
//! - an older version is rejected as stale
//! - the same version with the same content hash leaves the entry untouched
//!
//! Documents are stored behind `Arc`, so readers always observe a complete
//! document, either the one before a write or the one after it.
//!
//! # Example
//!
//! ```rust,ignore
//! use schemagate::cache::{SchemaCache, SystemClock};
//!
//! let cache = SchemaCache::new(Arc::new(SystemClock));
//! cache.put(&key, doc.version, doc)?;
//! let fresh = cache.get(&key, 2);
//! ```

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metrics;
use crate::models::{EntityKey, SchemaDocument};
use crate::utils::error::CacheError;

/// A stored document plus bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub document: Arc<SchemaDocument>,

    /// When this entry was committed (from the injected clock)
    pub stored_at: DateTime<Utc>,
}

/// Result of a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PutOutcome {
    /// No previous entry existed
    Inserted,
    /// Previous entry was replaced; its version is reported
    Replaced { previous_version: u64 },
    /// Identical document already cached for this version
    Unchanged,
    /// A newer version is already cached; nothing was written
    Stale { cached_version: u64 },
}

impl PutOutcome {
    /// Whether the cache content changed
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced { .. } => "replaced",
            Self::Unchanged => "unchanged",
            Self::Stale { .. } => "stale",
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub stale_rejections: u64,
}

/// Thread-safe versioned document cache
///
/// Passed around explicitly (usually as `Arc<SchemaCache>`); there is no
/// process-wide instance.
pub struct SchemaCache {
    entries: DashMap<EntityKey, CacheEntry>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    stale_rejections: AtomicU64,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl SchemaCache {
    /// Create an empty cache with the given clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            stale_rejections: AtomicU64::new(0),
        }
    }

    /// Store a document for `(key, version)`
    ///
    /// # Errors
    ///
    /// Refuses documents whose key or version disagree with the arguments,
    /// and documents that have not been linked to a canonical URL.
    pub fn put(
        &self,
        key: &EntityKey,
        version: u64,
        document: SchemaDocument,
    ) -> Result<PutOutcome, CacheError> {
        if &document.key != key {
            return Err(CacheError::KeyMismatch {
                key: key.clone(),
                document: document.key.clone(),
            });
        }
        if document.version != version {
            return Err(CacheError::VersionMismatch {
                version,
                document: document.version,
            });
        }
        if !document.is_linked() {
            return Err(CacheError::Unlinked(key.clone()));
        }

        let fresh = CacheEntry {
            document: Arc::new(document),
            stored_at: self.clock.now(),
        };

        let outcome = match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                PutOutcome::Inserted
            }
            Entry::Occupied(mut occupied) => {
                let current = &occupied.get().document;
                if current.version > version {
                    PutOutcome::Stale {
                        cached_version: current.version,
                    }
                } else if current.version == version
                    && current.content_hash == fresh.document.content_hash
                    && current.canonical_url == fresh.document.canonical_url
                {
                    PutOutcome::Unchanged
                } else {
                    let previous_version = current.version;
                    if previous_version == version {
                        tracing::warn!(
                            entity = %key,
                            version,
                            "Content changed without a version bump, replacing cached document"
                        );
                    }
                    occupied.insert(fresh);
                    PutOutcome::Replaced { previous_version }
                }
            }
        };

        match outcome {
            PutOutcome::Inserted => {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            PutOutcome::Replaced { .. } => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            PutOutcome::Stale { cached_version } => {
                self.stale_rejections.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(entity = %key, version, cached_version, "Rejected stale cache write");
            }
            PutOutcome::Unchanged => {}
        }
        metrics::update_cached_documents(self.entries.len());

        Ok(outcome)
    }

    /// Fetch the document for an exact version
    ///
    /// Returns `None` when the cached document is for any other version.
    pub fn get(&self, key: &EntityKey, version: u64) -> Option<Arc<SchemaDocument>> {
        let found = self
            .entries
            .get(key)
            .filter(|entry| entry.document.version == version)
            .map(|entry| Arc::clone(&entry.document));
        self.record_lookup(found.is_some());
        found
    }

    /// Fetch the freshest cached document regardless of version
    pub fn latest(&self, key: &EntityKey) -> Option<Arc<SchemaDocument>> {
        let found = self.entries.get(key).map(|entry| Arc::clone(&entry.document));
        self.record_lookup(found.is_some());
        found
    }

    /// Full entry including the commit timestamp
    pub fn entry(&self, key: &EntityKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Version currently cached for a key, without counting a lookup
    pub fn cached_version(&self, key: &EntityKey) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.document.version)
    }

    /// Drop the entry for a key, returning the evicted version
    pub fn invalidate(&self, key: &EntityKey) -> Option<u64> {
        let removed = self.entries.remove(key).map(|(_, entry)| entry.document.version);
        if removed.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::update_cached_documents(self.entries.len());
        }
        removed
    }

    /// Drop everything
    pub fn clear(&self) {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.evictions.fetch_add(count, Ordering::Relaxed);
        metrics::update_cached_documents(0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys currently cached, sorted
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
        }
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(hit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use chrono::TimeZone;
    use serde_json::json;
    use url::Url;

    fn key() -> EntityKey {
        EntityKey::new(EntityType::Course, "course-1")
    }

    fn linked(version: u64, name: &str) -> SchemaDocument {
        let mut doc = SchemaDocument::new(
            key(),
            version,
            json!({"@type": "Course", "name": name}),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        doc.canonical_url = Some(Url::parse("https://example.com/courses/course-1").unwrap());
        doc
    }

    fn cache() -> (SchemaCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
        (SchemaCache::new(clock.clone()), clock)
    }

    #[test]
    fn test_put_and_get() {
        let (cache, _) = cache();
        assert_eq!(cache.put(&key(), 1, linked(1, "a")).unwrap(), PutOutcome::Inserted);

        assert!(cache.get(&key(), 1).is_some());
        assert!(cache.get(&key(), 2).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_newer_version_evicts_older() {
        let (cache, _) = cache();
        cache.put(&key(), 1, linked(1, "a")).unwrap();
        let outcome = cache.put(&key(), 2, linked(2, "b")).unwrap();

        assert_eq!(outcome, PutOutcome::Replaced { previous_version: 1 });
        assert!(cache.get(&key(), 1).is_none());
        assert_eq!(cache.get(&key(), 2).unwrap().body["name"], "b");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_older_version_rejected() {
        let (cache, _) = cache();
        cache.put(&key(), 3, linked(3, "c")).unwrap();
        let outcome = cache.put(&key(), 2, linked(2, "b")).unwrap();

        assert_eq!(outcome, PutOutcome::Stale { cached_version: 3 });
        assert_eq!(cache.latest(&key()).unwrap().version, 3);
        assert_eq!(cache.stats().stale_rejections, 1);
    }

    #[test]
    fn test_same_version_is_idempotent() {
        let (cache, clock) = cache();
        cache.put(&key(), 1, linked(1, "a")).unwrap();
        let first = cache.entry(&key()).unwrap();

        clock.advance(chrono::Duration::minutes(5));
        let mut again = linked(1, "a");
        again.generated_at = clock.now();
        assert_eq!(cache.put(&key(), 1, again).unwrap(), PutOutcome::Unchanged);

        let second = cache.entry(&key()).unwrap();
        assert_eq!(first.stored_at, second.stored_at);
        assert_eq!(*first.document, *second.document);
    }

    #[test]
    fn test_same_version_different_content_replaces() {
        let (cache, _) = cache();
        cache.put(&key(), 1, linked(1, "a")).unwrap();
        let outcome = cache.put(&key(), 1, linked(1, "changed")).unwrap();
        assert_eq!(outcome, PutOutcome::Replaced { previous_version: 1 });
        assert_eq!(cache.get(&key(), 1).unwrap().body["name"], "changed");
    }

    #[test]
    fn test_stored_at_uses_injected_clock() {
        let (cache, clock) = cache();
        cache.put(&key(), 1, linked(1, "a")).unwrap();
        assert_eq!(cache.entry(&key()).unwrap().stored_at, clock.now());
    }

    #[test]
    fn test_rejects_unlinked_and_mismatched() {
        let (cache, _) = cache();
        let mut unlinked = linked(1, "a");
        unlinked.canonical_url = None;
        assert!(matches!(cache.put(&key(), 1, unlinked), Err(CacheError::Unlinked(_))));

        assert!(matches!(
            cache.put(&key(), 2, linked(1, "a")),
            Err(CacheError::VersionMismatch { version: 2, document: 1 })
        ));

        let other = EntityKey::new(EntityType::Product, "p1");
        assert!(matches!(
            cache.put(&other, 1, linked(1, "a")),
            Err(CacheError::KeyMismatch { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let (cache, _) = cache();
        cache.put(&key(), 4, linked(4, "d")).unwrap();
        assert_eq!(cache.invalidate(&key()), Some(4));
        assert_eq!(cache.invalidate(&key()), None);
        assert!(cache.latest(&key()).is_none());
    }

    #[test]
    fn test_hit_miss_stats() {
        let (cache, _) = cache();
        cache.put(&key(), 1, linked(1, "a")).unwrap();
        cache.get(&key(), 1);
        cache.get(&key(), 9);
        cache.latest(&EntityKey::new(EntityType::Person, "nobody"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.writes, 1);
    }
}
