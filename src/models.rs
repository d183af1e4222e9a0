// Core data structures for schemagate

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// Maximum accepted length of an entity identifier
pub const MAX_ID_LEN: usize = 128;

/// schema.org types the generator knows how to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Course,
    Product,
    Article,
    Event,
    Organization,
    Person,
    WebPage,
}

impl EntityType {
    /// schema.org type name, used as `@type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "Course",
            Self::Product => "Product",
            Self::Article => "Article",
            Self::Event => "Event",
            Self::Organization => "Organization",
            Self::Person => "Person",
            Self::WebPage => "WebPage",
        }
    }

    /// Lowercase slug used in schema endpoint paths
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Product => "product",
            Self::Article => "article",
            Self::Event => "event",
            Self::Organization => "organization",
            Self::Person => "person",
            Self::WebPage => "webpage",
        }
    }

    /// Path segment used for content page URLs
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Course => "courses",
            Self::Product => "products",
            Self::Article => "articles",
            Self::Event => "events",
            Self::Organization => "organizations",
            Self::Person => "people",
            Self::WebPage => "pages",
        }
    }

    /// Parse from type name, slug or path segment (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|t| lower == t.slug() || lower == t.path_segment())
    }

    /// Resolve a content path segment back to its type
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::all().into_iter().find(|t| t.path_segment() == segment)
    }

    /// Get all types
    pub fn all() -> Vec<Self> {
        vec![
            Self::Course,
            Self::Product,
            Self::Article,
            Self::Event,
            Self::Organization,
            Self::Person,
            Self::WebPage,
        ]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that an identifier is safe to embed in a URL path segment
pub fn is_valid_id(id: &str) -> bool {
    static ID_RE: OnceLock<Regex> = OnceLock::new();

    let re = ID_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._~-]*$").expect("Invalid regex pattern")
    });

    id.len() <= MAX_ID_LEN && re.is_match(id)
}

/// Identity of a content entity: its type plus its identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }

    /// Build a key from raw path parameters
    pub fn parse(entity_type: &str, id: &str) -> Option<Self> {
        let entity_type = EntityType::parse(entity_type)?;
        if !is_valid_id(id) {
            return None;
        }
        Some(Self::new(entity_type, id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type.slug(), self.id)
    }
}

/// Parses the `slug/id` form produced by `Display`
impl FromStr for EntityKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity_type, id) = s
            .split_once('/')
            .ok_or_else(|| format!("expected '<type>/<id>', got {s:?}"))?;
        Self::parse(entity_type, id).ok_or_else(|| format!("invalid entity key {s:?}"))
    }
}

/// A content entity as published by the content-management system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntity {
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Monotonically increasing per entity
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Explicit content page URL; derived from the site origin when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,

    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl ContentEntity {
    pub fn new(entity_type: EntityType, id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            entity_type,
            version,
            updated_at: None,
            content_url: None,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_content_url(mut self, url: impl Into<String>) -> Self {
        self.content_url = Some(url.into());
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.id.clone())
    }
}

/// A generated JSON-LD document for one entity version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub key: EntityKey,
    pub version: u64,

    /// Set by the canonical linker; unlinked documents are never cached
    pub canonical_url: Option<Url>,

    pub generated_at: DateTime<Utc>,

    /// SHA-256 of the serialized JSON-LD body
    pub content_hash: String,

    pub body: Value,
}

impl SchemaDocument {
    pub fn new(key: EntityKey, version: u64, body: Value, generated_at: DateTime<Utc>) -> Self {
        let content_hash = hash_body(&body);
        Self {
            key,
            version,
            canonical_url: None,
            generated_at,
            content_hash,
            body,
        }
    }

    /// Recompute the content hash after the body changed
    pub fn rehash(&mut self) {
        self.content_hash = hash_body(&self.body);
    }

    pub fn is_linked(&self) -> bool {
        self.canonical_url.is_some()
    }

    /// Strong ETag derived from the content hash
    pub fn etag(&self) -> String {
        format!("\"{}\"", &self.content_hash[..16.min(self.content_hash.len())])
    }

    /// Serialize the JSON-LD body
    pub fn to_json_ld(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.body)
    }
}

/// Hash the compact serialization of a JSON value
pub fn hash_body(body: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content URL ↔ schema URL pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMapping {
    pub key: EntityKey,
    pub content_url: Url,

    /// Path of the schema endpoint on this service
    pub schema_path: String,
}

impl EndpointMapping {
    /// Path component of the content URL
    pub fn content_path(&self) -> &str {
        self.content_url.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("Course"), Some(EntityType::Course));
        assert_eq!(EntityType::parse("course"), Some(EntityType::Course));
        assert_eq!(EntityType::parse("courses"), Some(EntityType::Course));
        assert_eq!(EntityType::parse("PEOPLE"), Some(EntityType::Person));
        assert_eq!(EntityType::parse("recipe"), None);
    }

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("course-1"));
        assert!(is_valid_id("SKU_42.v2"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("-leading-dash"));
        assert!(!is_valid_id("has/slash"));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id(&"a".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn test_entity_key_display() {
        let key = EntityKey::new(EntityType::Course, "course-1");
        assert_eq!(key.to_string(), "course/course-1");
        assert_eq!(EntityKey::parse("course", "course-1"), Some(key));
        assert_eq!(EntityKey::parse("course", "../etc"), None);
    }

    #[test]
    fn test_entity_key_from_str() {
        let key: EntityKey = "product/sku-9".parse().unwrap();
        assert_eq!(key, EntityKey::new(EntityType::Product, "sku-9"));
        assert!("product".parse::<EntityKey>().is_err());
        assert!("recipe/x".parse::<EntityKey>().is_err());
    }

    #[test]
    fn test_entity_deserialize() {
        let entity: ContentEntity = serde_json::from_value(json!({
            "id": "course-1",
            "type": "Course",
            "version": 2,
            "fields": { "name": "Rust 101" }
        }))
        .unwrap();

        assert_eq!(entity.entity_type, EntityType::Course);
        assert_eq!(entity.version, 2);
        assert_eq!(entity.fields["name"], "Rust 101");
        assert!(entity.content_url.is_none());
    }

    #[test]
    fn test_hash_changes_with_body() {
        let a = json!({"@type": "Course", "name": "x"});
        let b = json!({"@type": "Course", "name": "y"});
        assert_eq!(hash_body(&a), hash_body(&a.clone()));
        assert_ne!(hash_body(&a), hash_body(&b));
    }

    #[test]
    fn test_document_etag() {
        let doc = SchemaDocument::new(
            EntityKey::new(EntityType::Product, "p1"),
            1,
            json!({"@type": "Product"}),
            Utc::now(),
        );
        let etag = doc.etag();
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag.len(), 18);
        assert!(!doc.is_linked());
    }
}
