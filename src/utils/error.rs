//! Error types for schema generation, linking, routing and upstream reads
//!
//! This module defines the domain error types used throughout the service.

use thiserror::Error;

use crate::models::EntityKey;

/// Required fields missing or invalid on a content entity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed for {entity}: {}", .problems.join("; "))]
pub struct ValidationError {
    /// `slug/id` of the offending entity, or the raw id when it could not be keyed
    pub entity: String,

    /// Missing required fields, in vocabulary order
    pub missing: Vec<String>,

    /// Human-readable problems (one per missing field or invalid value)
    pub problems: Vec<String>,
}

impl ValidationError {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            missing: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Record a missing required field
    pub fn missing_field(&mut self, field: &str) {
        self.missing.push(field.to_string());
        self.problems.push(format!("missing required field '{field}'"));
    }

    /// Record any other problem
    pub fn invalid(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Why a canonical URL was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    /// URL could not be parsed
    Unparsable,
    /// Scheme, host or port differs from the site origin
    CrossOrigin,
    /// URL points at a schema endpoint instead of the content page
    SelfReference,
}

impl MismatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unparsable => "unparsable URL",
            Self::CrossOrigin => "different site origin",
            Self::SelfReference => "points at a schema endpoint",
        }
    }
}

/// Canonical URL does not belong to the content entity's site
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Canonical URL '{url}' rejected for {entity}: {} (site origin {expected_origin})", .reason.as_str())]
pub struct CanonicalMismatchError {
    pub entity: String,
    pub url: String,
    pub expected_origin: String,
    pub reason: MismatchReason,
}

/// Entity or path has no endpoint mapping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("No schema mapped for entity {0}")]
    Entity(EntityKey),

    #[error("No endpoint mapped for path '{0}'")]
    Path(String),

    #[error("Unknown entity type or id: {entity_type}/{id}")]
    InvalidKey { entity_type: String, id: String },
}

/// Errors returned by the content-management collaborator
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request did not complete within the configured timeout
    #[error("Upstream request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Rate limit exceeded (429)
    #[error("Upstream rate limit exceeded")]
    RateLimit,

    /// Server error with status code
    #[error("Upstream server error: {0}")]
    Server(u16),

    /// Unexpected non-success status
    #[error("Unexpected upstream status: {0}")]
    Status(u16),

    /// Entity does not exist upstream
    #[error("Entity {0} not found upstream")]
    NotFound(EntityKey),

    /// Response body could not be decoded into an entity
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Upstream answered with a different entity than requested
    #[error("Upstream returned {returned} when {requested} was requested")]
    WrongEntity {
        requested: EntityKey,
        returned: EntityKey,
    },

    /// No content source configured
    #[error("No content source configured")]
    Unconfigured,
}

impl UpstreamError {
    /// Transient errors are worth retrying with backoff
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::RateLimit | Self::Server(_) => true,
            Self::Status(_)
            | Self::NotFound(_)
            | Self::Decode(_)
            | Self::WrongEntity { .. }
            | Self::Unconfigured => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Timeout { .. } => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Server(_) => "server",
            Self::Status(_) => "status",
            Self::NotFound(_) => "not_found",
            Self::Decode(_) => "decode",
            Self::WrongEntity { .. } => "wrong_entity",
            Self::Unconfigured => "unconfigured",
        }
    }
}

/// Cache write refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Document for {document} cannot be stored under {key}")]
    KeyMismatch { key: EntityKey, document: EntityKey },

    #[error("Document version {document} does not match write version {version}")]
    VersionMismatch { version: u64, document: u64 },

    #[error("Document for {0} has no canonical URL")]
    Unlinked(EntityKey),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn test_validation_error_message() {
        let mut err = ValidationError::new("course/c1");
        err.missing_field("name");
        err.missing_field("description");

        assert_eq!(err.missing, vec!["name", "description"]);
        let msg = err.to_string();
        assert!(msg.contains("course/c1"));
        assert!(msg.contains("'name'"));
        assert!(msg.contains("'description'"));
    }

    #[test]
    fn test_upstream_recoverable() {
        assert!(UpstreamError::Timeout { timeout_ms: 10 }.is_recoverable());
        assert!(UpstreamError::Server(503).is_recoverable());
        assert!(!UpstreamError::Status(400).is_recoverable());
        assert!(!UpstreamError::NotFound(EntityKey::new(EntityType::Course, "c1")).is_recoverable());
        assert!(UpstreamError::Timeout { timeout_ms: 10 }.is_timeout());
        assert!(!UpstreamError::Server(500).is_timeout());
    }

    #[test]
    fn test_mismatch_message() {
        let err = CanonicalMismatchError {
            entity: "course/c1".to_string(),
            url: "https://evil.example/courses/c1".to_string(),
            expected_origin: "https://example.com".to_string(),
            reason: MismatchReason::CrossOrigin,
        };
        assert!(err.to_string().contains("different site origin"));
    }
}
