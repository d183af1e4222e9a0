//! Endpoint router
//!
//! Keeps the one-to-one mapping between content page URLs and schema endpoint
//! paths, and classifies inbound request paths as either a schema or a content
//! representation.
//!
//! Two layouts are supported:
//!
//! ```text
//! centralized:  /courses/course-1  <->  /schema/course/course-1
//! parallel:     /courses/course-1  <->  /courses/course-1/schema.jsonld
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use url::Url;

use crate::error::{Error, Result};
use crate::models::{EndpointMapping, EntityKey, EntityType};
use crate::utils::error::NotFoundError;

/// Default prefix for centralized schema endpoints
pub const DEFAULT_SCHEMA_PREFIX: &str = "/schema";

/// Default suffix for parallel schema endpoints
pub const DEFAULT_PARALLEL_SUFFIX: &str = "/schema.jsonld";

/// Where schema endpoints live relative to content pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EndpointLayout {
    /// All schema endpoints under one prefix: `<prefix>/<slug>/<id>`
    Centralized { prefix: String },
    /// Schema endpoint next to each content page: `<content path><suffix>`
    Parallel { suffix: String },
}

impl Default for EndpointLayout {
    fn default() -> Self {
        Self::Centralized {
            prefix: DEFAULT_SCHEMA_PREFIX.to_string(),
        }
    }
}

impl EndpointLayout {
    pub fn parallel() -> Self {
        Self::Parallel {
            suffix: DEFAULT_PARALLEL_SUFFIX.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Centralized { .. } => "centralized",
            Self::Parallel { .. } => "parallel",
        }
    }
}

/// Classified request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Request for the JSON-LD representation
    Schema(EntityKey),
    /// Request for the content page
    Content(EntityKey),
}

impl Route {
    pub fn key(&self) -> &EntityKey {
        match self {
            Self::Schema(key) | Self::Content(key) => key,
        }
    }
}

#[derive(Debug, Default)]
struct MappingTable {
    by_key: HashMap<EntityKey, EndpointMapping>,
    by_content_path: HashMap<String, EntityKey>,
    by_schema_path: HashMap<String, EntityKey>,
}

/// Bidirectional content ↔ schema endpoint registry
#[derive(Debug)]
pub struct EndpointRouter {
    layout: EndpointLayout,
    table: RwLock<MappingTable>,
}

impl EndpointRouter {
    pub fn new(layout: EndpointLayout) -> Self {
        Self {
            layout,
            table: RwLock::new(MappingTable::default()),
        }
    }

    pub fn layout(&self) -> &EndpointLayout {
        &self.layout
    }

    /// Schema endpoint path for an entity served from `content_url`
    pub fn schema_path(&self, key: &EntityKey, content_url: &Url) -> String {
        match &self.layout {
            EndpointLayout::Centralized { prefix } => format!(
                "{}/{}/{}",
                prefix.trim_end_matches('/'),
                key.entity_type.slug(),
                key.id
            ),
            EndpointLayout::Parallel { suffix } => {
                format!("{}{}", content_url.path().trim_end_matches('/'), suffix)
            }
        }
    }

    /// Whether a path falls under the schema endpoint convention
    pub fn is_schema_path(&self, path: &str) -> bool {
        match &self.layout {
            EndpointLayout::Centralized { prefix } => {
                let prefix = prefix.trim_end_matches('/');
                path.strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            }
            EndpointLayout::Parallel { suffix } => path.ends_with(suffix.as_str()),
        }
    }

    /// Map an entity to its content URL
    ///
    /// Re-registering a key moves its mapping to the new content URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MappingConflict`] when the content path already belongs
    /// to a different entity.
    pub fn register(&self, key: &EntityKey, content_url: &Url) -> Result<EndpointMapping> {
        let content_path = normalize_path(content_url.path());
        let schema_path = self.schema_path(key, content_url);

        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());

        for (path, index) in [
            (&content_path, &table.by_content_path),
            (&schema_path, &table.by_schema_path),
        ] {
            if let Some(existing) = index.get(path) {
                if existing != key {
                    return Err(Error::MappingConflict {
                        content_path: content_path.clone(),
                        existing: existing.clone(),
                    });
                }
            }
        }

        if let Some(previous) = table.by_key.remove(key) {
            table.by_content_path.remove(&normalize_path(previous.content_path()));
            table.by_schema_path.remove(&previous.schema_path);
        }

        let mapping = EndpointMapping {
            key: key.clone(),
            content_url: content_url.clone(),
            schema_path: schema_path.clone(),
        };
        table.by_content_path.insert(content_path, key.clone());
        table.by_schema_path.insert(schema_path, key.clone());
        table.by_key.insert(key.clone(), mapping.clone());

        Ok(mapping)
    }

    /// Remove an entity's mapping
    pub fn unregister(&self, key: &EntityKey) -> Option<EndpointMapping> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let mapping = table.by_key.remove(key)?;
        table.by_content_path.remove(&normalize_path(mapping.content_path()));
        table.by_schema_path.remove(&mapping.schema_path);
        Some(mapping)
    }

    pub fn mapping(&self, key: &EntityKey) -> Option<EndpointMapping> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.by_key.get(key).cloned()
    }

    pub fn is_mapped(&self, key: &EntityKey) -> bool {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.by_key.contains_key(key)
    }

    /// All mappings, sorted by key
    pub fn mappings(&self) -> Vec<EndpointMapping> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let mut mappings: Vec<_> = table.by_key.values().cloned().collect();
        mappings.sort_by(|a, b| a.key.cmp(&b.key));
        mappings
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(|e| e.into_inner()).by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify a request path
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Path`] for paths with no mapping.
    pub fn resolve(&self, path: &str) -> std::result::Result<Route, NotFoundError> {
        let path = normalize_path(path);
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        if self.is_schema_path(&path) {
            if let Some(key) = table.by_schema_path.get(&path) {
                return Ok(Route::Schema(key.clone()));
            }
        }
        if let Some(key) = table.by_content_path.get(&path) {
            return Ok(Route::Content(key.clone()));
        }

        Err(NotFoundError::Path(path))
    }

    /// Parse a schema path back into a key, without consulting mappings
    ///
    /// Parallel paths are only understood for derived content URLs
    /// (`/<segment>/<id><suffix>`).
    pub fn parse_schema_path(&self, path: &str) -> Option<EntityKey> {
        let (entity_type, rest) = match &self.layout {
            EndpointLayout::Centralized { prefix } => {
                let rest = path.strip_prefix(prefix.trim_end_matches('/'))?;
                let mut parts = rest.trim_start_matches('/').splitn(2, '/');
                (EntityType::parse(parts.next()?)?, parts.next()?)
            }
            EndpointLayout::Parallel { suffix } => {
                let content = path.strip_suffix(suffix.as_str())?;
                let (segment, id) = content.trim_start_matches('/').split_once('/')?;
                (EntityType::from_path_segment(segment)?, id)
            }
        };
        EntityKey::parse(entity_type.slug(), rest)
    }
}

/// Strip trailing slashes (but keep the root)
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
