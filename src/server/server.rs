//! Schema server implementation
//!
//! This module provides the server that wires the schema service to HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::EntityKey;
use crate::service::SchemaService;

use super::api::create_router;
use super::config::ServerConfig;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Generation, linking, routing and caching
    pub service: Arc<SchemaService>,

    /// Server start time
    pub start_time: Instant,

    /// Configuration
    pub config: ServerConfig,
}

// ============================================================================
// Schema Server
// ============================================================================

/// HTTP front end of the schema service
pub struct SchemaServer {
    config: ServerConfig,
    state: AppState,
}

impl SchemaServer {
    /// Create a new schema server
    pub fn new(config: ServerConfig, service: Arc<SchemaService>) -> Result<Self, ServerError> {
        config.validate().map_err(|e| ServerError::Config(e.to_string()))?;

        let state = AppState {
            service,
            start_time: Instant::now(),
            config: config.clone(),
        };

        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        self.warm().await;

        tracing::info!(
            %addr,
            layout = self.state.service.router().layout().name(),
            "Starting schema server"
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Schema server shutdown complete");
        Ok(())
    }

    /// Refresh the configured warm keys
    async fn warm(&self) {
        let keys: Vec<EntityKey> = self
            .config
            .warm_keys
            .iter()
            .filter_map(|k| k.parse().ok())
            .collect();
        if keys.is_empty() {
            return;
        }

        let report = self.state.service.warm(keys).await;
        for failure in &report.failures {
            tracing::warn!(entity = %failure.key, error = %failure.error, "Warm-up failed");
        }
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        let service = &self.state.service;
        ServerInfo {
            bind_address: self.config.bind_address,
            layout: service.router().layout().name(),
            source: service.source_name().to_string(),
            origin: service.linker().origin(),
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub layout: &'static str,
    pub source: String,
    pub origin: String,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Schema Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Site Origin: {}\n\
             Layout: {}\n\
             Content Source: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.origin,
            self.layout,
            self.source,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

// ============================================================================
// Tests
// ============================================================================
