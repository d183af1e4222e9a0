//! HTTP server for schema endpoints
//!
//! Serves JSON-LD to crawlers from endpoints that sit apart from the content
//! pages, plus a small admin API for the content-management system.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Schema Server               │
//! │                                          │
//! │  ┌────────────────────────────────────┐  │
//! │  │        Crawler-facing routes       │  │
//! │  │  GET /schema/{type}/{id}           │  │
//! │  │  GET {content}/schema.jsonld       │  │
//! │  │  GET /sitemap.xml                  │  │
//! │  └────────────────────────────────────┘  │
//! │                                          │
//! │  ┌────────────────────────────────────┐  │
//! │  │             Admin API              │  │
//! │  │  POST   /api/entities              │  │
//! │  │  POST   /api/entities/{t}/{id}/... │  │
//! │  │  DELETE /api/entities/{t}/{id}     │  │
//! │  │  GET    /api/links/{t}/{id}        │  │
//! │  │  GET    /api/health, /api/stats    │  │
//! │  └────────────────────────────────────┘  │
//! │                                          │
//! │              SchemaService               │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use schemagate::server::{SchemaServer, ServerConfig};
//!
//! let service = Arc::new(SchemaService::from_config(&config)?);
//! let server = SchemaServer::new(ServerConfig::default(), service)?;
//! server.start().await?;
//! ```

pub mod api;
pub mod config;
pub mod server;

// Re-export main types
pub use api::create_router;
pub use config::ServerConfig;
pub use server::{AppState, SchemaServer, ServerError};
