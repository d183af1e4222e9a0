//! REST API and schema endpoint handlers
//!
//! Routes:
//!
//! ```text
//! GET    {prefix}/{type}/{id}              JSON-LD (centralized layout)
//! GET    <any other path>                  parallel schema, redirect to content, or 404
//! GET    /sitemap.xml                      content URLs only
//! GET    /metrics                          Prometheus exposition
//! GET    /api/health
//! GET    /api/stats
//! POST   /api/entities                     regenerate from a pushed entity
//! POST   /api/entities/{type}/{id}/refresh re-read from the content source
//! DELETE /api/entities/{type}/{id}
//! GET    /api/links/{type}/{id}            canonical/alternate head snippet
//! POST   /api/warm                         refresh a list of keys
//! ```

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, SchemaGateErrorTrait};
use crate::metrics;
use crate::models::{ContentEntity, EntityKey, SchemaDocument};
use crate::router::{EndpointLayout, Route};
use crate::service::{BatchReport, LinkSet, RefreshOutcome, RegenerateOutcome, ServiceStats};
use crate::utils::error::NotFoundError;

use super::server::AppState;

/// Media type of schema documents
pub const JSON_LD: &str = "application/ld+json";

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub category: &'static str,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, category: &'static str) -> Self {
        Self {
            success: false,
            error: message.into(),
            category,
        }
    }
}

/// Error returned from handlers, rendered with the status of the wrapped error
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<NotFoundError> for ApiError {
    fn from(err: NotFoundError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        let body = ErrorResponse::new(self.0.to_string(), self.0.category().as_str());
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub cached_documents: usize,
    pub mappings: usize,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub service: ServiceStats,
    pub uptime_secs: u64,
}

/// Refresh response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub key: EntityKey,
    pub version: u64,
    pub etag: String,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regeneration: Option<RegenerateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        let document = outcome.document();
        let (key, version, etag) = (document.key.clone(), document.version, document.etag());
        match outcome {
            RefreshOutcome::Regenerated { outcome, .. } => Self {
                key,
                version,
                etag,
                fallback: false,
                regeneration: Some(outcome),
                error: None,
            },
            RefreshOutcome::Fallback { error, .. } => Self {
                key,
                version,
                etag,
                fallback: true,
                regeneration: None,
                error: Some(error),
            },
        }
    }
}

/// Warm request
#[derive(Debug, Deserialize)]
pub struct WarmRequest {
    /// Entity keys as `type/id`
    pub keys: Vec<String>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health endpoints
        .route("/api/health", get(health_check))
        .route("/api/stats", get(get_stats))
        // Entity endpoints
        .route("/api/entities", post(push_entity))
        .route("/api/entities/{entity_type}/{id}", delete(remove_entity))
        .route("/api/entities/{entity_type}/{id}/refresh", post(refresh_entity))
        .route("/api/links/{entity_type}/{id}", get(get_links))
        .route("/api/warm", post(warm))
        // Crawler-facing endpoints
        .route("/sitemap.xml", get(sitemap))
        .route("/metrics", get(prometheus_metrics));

    if let EndpointLayout::Centralized { prefix } = state.service.router().layout() {
        let path = format!("{}/{{entity_type}}/{{id}}", prefix.trim_end_matches('/'));
        router = router.route(&path, get(get_schema));
    }

    router
        .fallback(resolve_path)
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Record request count and latency per matched route
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "fallback".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

fn parse_key(entity_type: &str, id: &str) -> Result<EntityKey, NotFoundError> {
    EntityKey::parse(entity_type, id).ok_or_else(|| NotFoundError::InvalidKey {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
    })
}

// ============================================================================
// Schema Handlers
// ============================================================================

/// Render a schema document with crawler-facing headers
///
/// Answers `304 Not Modified` when `If-None-Match` carries the current ETag.
pub fn schema_response(document: &SchemaDocument, request_headers: &HeaderMap) -> Response {
    let etag = document.etag();
    let not_modified = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(',')
                .map(|tag| tag.trim().trim_start_matches("W/"))
                .any(|tag| tag == "*" || tag == etag)
        });

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    headers.insert("x-robots-tag", HeaderValue::from_static("noindex"));
    if let Some(canonical) = &document.canonical_url {
        if let Ok(value) = HeaderValue::from_str(&format!("<{canonical}>; rel=\"canonical\"")) {
            headers.insert(header::LINK, value);
        }
    }

    if not_modified {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }

    match document.to_json_ld() {
        Ok(body) => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_LD));
            (StatusCode::OK, headers, body).into_response()
        }
        Err(e) => ApiError(Error::Json(e)).into_response(),
    }
}

/// Centralized schema endpoint
async fn get_schema(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let key = parse_key(&entity_type, &id)?;
    // Only the slug spelling is a schema endpoint; aliases would duplicate it
    if entity_type != key.entity_type.slug() {
        return Err(NotFoundError::Path(uri.path().to_string()).into());
    }

    let document = state.service.document(&key).await?;
    let served_here = state
        .service
        .router()
        .mapping(&key)
        .is_some_and(|m| m.schema_path == uri.path().trim_end_matches('/'));
    if !served_here {
        return Err(NotFoundError::Path(uri.path().to_string()).into());
    }
    Ok(schema_response(&document, &headers))
}

/// Everything that is not an explicit route
///
/// Mapped schema paths serve the document, mapped content paths redirect to
/// the canonical page, and unmapped parallel schema paths fall back to a
/// lazy fetch.
async fn resolve_path(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if method != Method::GET && method != Method::HEAD {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let service = &state.service;
    let path = uri.path();

    match service.router().resolve(path) {
        Ok(Route::Schema(key)) => {
            let document = service.document(&key).await?;
            Ok(schema_response(&document, &headers))
        }
        Ok(Route::Content(key)) => {
            let mapping = service
                .router()
                .mapping(&key)
                .ok_or_else(|| Error::not_found(key.clone()))?;
            Ok(Redirect::temporary(mapping.content_url.as_str()).into_response())
        }
        Err(not_found) => {
            let Some(key) = service.router().parse_schema_path(path) else {
                return Err(not_found.into());
            };
            let document = service.document(&key).await?;
            // The entity may have been mapped under a different content path
            let served_here = service
                .router()
                .mapping(&key)
                .is_some_and(|m| m.schema_path == path.trim_end_matches('/'));
            if !served_here {
                return Err(not_found.into());
            }
            Ok(schema_response(&document, &headers))
        }
    }
}

/// Sitemap of content pages
async fn sitemap(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        state.service.sitemap(),
    )
}

/// Prometheus text exposition
async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to encode metrics: {e}"), "other")),
        )
            .into_response(),
    }
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        cached_documents: state.service.cache().len(),
        mappings: state.service.router().len(),
    }))
}

/// Get service stats
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(StatsResponse {
        service: state.service.stats(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// ============================================================================
// Entity Handlers
// ============================================================================

/// Regenerate from an entity pushed by the content-management system
async fn push_entity(
    State(state): State<AppState>,
    Json(entity): Json<ContentEntity>,
) -> ApiResult<Json<ApiResponse<RegenerateOutcome>>> {
    let outcome = state.service.regenerate(&entity).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Re-read an entity from the content source
async fn refresh_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<RefreshResponse>>> {
    let key = parse_key(&entity_type, &id)?;
    let outcome = state.service.refresh(&key).await?;
    Ok(Json(ApiResponse::success(RefreshResponse::from(outcome))))
}

/// Remove an entity's mapping and cached document
async fn remove_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let key = parse_key(&entity_type, &id)?;
    if state.service.remove(&key).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found(key).into())
    }
}

/// Head snippet and URLs for a mapped entity
async fn get_links(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<LinkSet>>> {
    let key = parse_key(&entity_type, &id)?;
    let links = state.service.links(&key)?;
    Ok(Json(ApiResponse::success(links)))
}

/// Refresh a batch of entities
async fn warm(
    State(state): State<AppState>,
    Json(request): Json<WarmRequest>,
) -> ApiResult<Json<ApiResponse<BatchReport>>> {
    let mut keys = Vec::with_capacity(request.keys.len());
    for raw in &request.keys {
        let key: EntityKey = raw.parse().map_err(|_| NotFoundError::InvalidKey {
            entity_type: raw.split_once('/').map(|(t, _)| t).unwrap_or(raw).to_string(),
            id: raw.split_once('/').map(|(_, id)| id).unwrap_or_default().to_string(),
        })?;
        keys.push(key);
    }

    let report = state.service.warm(keys).await;
    Ok(Json(ApiResponse::success(report)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use chrono::Utc;
    use serde_json::json;
    use url::Url;

    fn document() -> SchemaDocument {
        let mut doc = SchemaDocument::new(
            EntityKey::new(EntityType::Course, "c1"),
            1,
            json!({"@type": "Course"}),
            Utc::now(),
        );
        doc.canonical_url = Some(Url::parse("https://example.com/courses/c1").unwrap());
        doc
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response_status() {
        let response = ApiError(Error::not_found(EntityKey::new(EntityType::Course, "x"))).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_schema_response_headers() {
        let doc = document();
        let response = schema_response(&doc, &HeaderMap::new());
        let headers = response.headers();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], JSON_LD);
        assert_eq!(headers["x-robots-tag"], "noindex");
        assert_eq!(
            headers[header::LINK],
            "<https://example.com/courses/c1>; rel=\"canonical\""
        );
        assert_eq!(headers[header::ETAG], doc.etag().as_str());
    }

    #[test]
    fn test_schema_response_not_modified() {
        let doc = document();
        let mut request = HeaderMap::new();
        request.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_str(&format!("\"other\", {}", doc.etag())).unwrap(),
        );
        assert_eq!(schema_response(&doc, &request).status(), StatusCode::NOT_MODIFIED);

        request.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"stale\""));
        assert_eq!(schema_response(&doc, &request).status(), StatusCode::OK);
    }
}
