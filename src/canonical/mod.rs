//! Canonical linker
//!
//! Binds generated schema documents to the authoritative content page URL and
//! renders the `<head>` cross-references content pages embed. A canonical URL
//! must live on the configured site origin and must never point back at a
//! schema endpoint.

use serde_json::{json, Value};
use url::{Origin, Url};

use crate::models::{EntityKey, SchemaDocument};
use crate::utils::error::{CanonicalMismatchError, MismatchReason};

/// Attaches canonical content URLs to schema documents
#[derive(Debug, Clone)]
pub struct CanonicalLinker {
    site: Url,
    origin: Origin,
    schema_prefix: String,
    schema_suffix: Option<String>,
}

impl CanonicalLinker {
    /// Create a linker for a site origin such as `https://example.com`
    ///
    /// `schema_prefix` is the path prefix reserved for centralized schema
    /// endpoints (for example `/schema/`).
    pub fn new(site: Url, schema_prefix: impl Into<String>) -> Self {
        let origin = site.origin();
        Self {
            site,
            origin,
            schema_prefix: normalize_prefix(&schema_prefix.into()),
            schema_suffix: None,
        }
    }

    /// Also treat paths ending in `suffix` as schema endpoints (parallel layout)
    pub fn with_schema_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.schema_suffix = Some(suffix.into());
        self
    }

    /// The site's origin serialized as `scheme://host[:port]`
    pub fn origin(&self) -> String {
        self.origin.ascii_serialization()
    }

    /// Default content page URL for an entity: `<origin>/<segment>/<id>`
    pub fn content_url_for(&self, key: &EntityKey) -> Url {
        let mut url = self.site.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .clear()
                .push(key.entity_type.path_segment())
                .push(&key.id);
        }
        url
    }

    /// Validate a candidate canonical URL for an entity
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalMismatchError`] when the URL does not parse, lives
    /// on another origin, or addresses a schema endpoint.
    pub fn check(&self, key: &EntityKey, candidate: &str) -> Result<Url, CanonicalMismatchError> {
        let mismatch = |reason| CanonicalMismatchError {
            entity: key.to_string(),
            url: candidate.to_string(),
            expected_origin: self.origin(),
            reason,
        };

        let mut url = Url::parse(candidate.trim()).map_err(|_| mismatch(MismatchReason::Unparsable))?;
        if url.cannot_be_a_base() {
            return Err(mismatch(MismatchReason::Unparsable));
        }
        if url.origin() != self.origin {
            return Err(mismatch(MismatchReason::CrossOrigin));
        }
        if self.is_schema_path(url.path()) {
            return Err(mismatch(MismatchReason::SelfReference));
        }

        url.set_fragment(None);
        Ok(url)
    }

    /// Set the canonical URL on a document
    ///
    /// Writes `url` and `mainEntityOfPage` into the JSON-LD body and refreshes
    /// the content hash.
    pub fn link(
        &self,
        mut document: SchemaDocument,
        content_url: &str,
    ) -> Result<SchemaDocument, CanonicalMismatchError> {
        let url = self.check(&document.key, content_url)?;

        if let Value::Object(body) = &mut document.body {
            body.insert("url".to_string(), Value::String(url.to_string()));
            body.insert(
                "mainEntityOfPage".to_string(),
                json!({ "@type": "WebPage", "@id": url.as_str() }),
            );
        }
        document.canonical_url = Some(url);
        document.rehash();
        Ok(document)
    }

    /// Whether a request path addresses a schema endpoint rather than content
    pub fn is_schema_path(&self, path: &str) -> bool {
        if path.starts_with(&self.schema_prefix) || path == self.schema_prefix.trim_end_matches('/') {
            return true;
        }
        self.schema_suffix
            .as_deref()
            .is_some_and(|suffix| path.ends_with(suffix))
    }
}

/// Render the `<head>` snippet a content page embeds
///
/// The canonical link points at the page itself; the alternate link is the
/// only place the schema endpoint is advertised.
pub fn link_tags(content_url: &Url, schema_url: &Url) -> String {
    format!(
        "<link rel=\"canonical\" href=\"{}\">\n<link rel=\"alternate\" type=\"application/ld+json\" href=\"{}\">",
        html_escape::encode_double_quoted_attribute(content_url.as_str()),
        html_escape::encode_double_quoted_attribute(schema_url.as_str()),
    )
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/schema/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
