//! Unified error handling for the schemagate crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`SchemaGateErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use schemagate::error::{Error, SchemaGateErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error ({}): {err}", err.status_code());
//!     }
//! }
//! ```

use axum::http::StatusCode;
use std::io;
use thiserror::Error;

use crate::models::EntityKey;

// Re-export domain-specific errors for convenience
pub use crate::utils::error::{
    CacheError, CanonicalMismatchError, MismatchReason, NotFoundError, UpstreamError,
    ValidationError,
};

/// Common trait for all schemagate error types
///
/// This trait provides a unified interface for error handling across
/// all modules, enabling consistent error processing strategies.
pub trait SchemaGateErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;

    /// HTTP status used when the error reaches an API client
    fn status_code(&self) -> StatusCode;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Entity failed schema validation
    Validation,
    /// Canonical URL rejected
    Linking,
    /// Unmapped entity or path, mapping conflicts
    Routing,
    /// Content source errors (HTTP, timeout)
    Upstream,
    /// Cache and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Linking => "linking",
            Self::Routing => "routing",
            Self::Upstream => "upstream",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the schemagate crate
#[derive(Error, Debug)]
pub enum Error {
    /// Entity is missing required fields
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Canonical URL rejected by the linker
    #[error(transparent)]
    CanonicalMismatch(#[from] CanonicalMismatchError),

    /// Unmapped entity or URL
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Content path already owned by another entity
    #[error("Content path '{content_path}' is already mapped to {existing}")]
    MappingConflict {
        content_path: String,
        existing: EntityKey,
    },

    /// Content source errors
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Cache write refused
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SchemaGateErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Validation(_)
            | Self::CanonicalMismatch(_)
            | Self::NotFound(_)
            | Self::MappingConflict { .. }
            | Self::Cache(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::CanonicalMismatch(_) => ErrorCategory::Linking,
            Self::NotFound(_) | Self::MappingConflict { .. } => ErrorCategory::Routing,
            Self::Upstream(_) => ErrorCategory::Upstream,
            Self::Cache(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::CanonicalMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MappingConflict { .. } => StatusCode::CONFLICT,
            Self::Upstream(UpstreamError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(UpstreamError::Unconfigured) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Cache(_) | Self::Io(_) | Self::Config(_) | Self::Other { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for an unmapped entity
    pub fn not_found(key: EntityKey) -> Self {
        Self::NotFound(NotFoundError::Entity(key))
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
