//! schemagate - Structured-data generation and canonical linking service
//!
//! Produces schema.org JSON-LD documents for content entities, binds each one
//! to the authoritative content page URL, and serves them to crawlers from
//! endpoints that sit apart from the front-end HTML pages.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Core data structures and types
//! - [`schema`] - Per-type vocabulary and JSON-LD generation
//! - [`canonical`] - Canonical URL validation and `<head>` link tags
//! - [`router`] - Content URL ↔ schema endpoint mappings
//! - [`cache`] - Versioned document cache
//! - [`upstream`] - Content sources (HTTP, static file)
//! - [`service`] - Orchestration of fetch, generate, link, map and cache
//! - [`server`] - axum HTTP server and admin API
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use schemagate::config::Config;
//! use schemagate::models::{ContentEntity, EntityType};
//! use schemagate::service::SchemaService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let service = Arc::new(SchemaService::from_config(&config)?);
//!
//!     let entity = ContentEntity::new(EntityType::Course, "course-1", 2)
//!         .with_field("name", "Rust 101")
//!         .with_field("description", "Ownership and borrowing");
//!     service.regenerate(&entity).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod canonical;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod router;
pub mod schema;
pub mod server;
pub mod service;
pub mod upstream;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{PutOutcome, SchemaCache};
    pub use crate::canonical::CanonicalLinker;
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, SchemaGateErrorTrait};
    pub use crate::models::{ContentEntity, EndpointMapping, EntityKey, EntityType, SchemaDocument};
    pub use crate::router::{EndpointLayout, EndpointRouter, Route};
    pub use crate::schema::SchemaGenerator;
    pub use crate::service::SchemaService;
    pub use crate::upstream::ContentSource;
}

// Direct re-exports for convenience
pub use models::{ContentEntity, EntityKey, EntityType, SchemaDocument};
