//! Prometheus metrics for schemagate
//!
//! This module provides metrics tracking for:
//! - Cache: hits, misses, documents currently cached
//! - Service: regenerations by entity type and outcome, upstream failures
//! - HTTP: API requests by endpoint and status, request latency
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for cache and service metrics
struct SchemaMetrics {
    cache_hits: Counter,
    cache_misses: Counter,
    cached_documents: Gauge,
    regenerations: CounterVec,
    regeneration_duration: HistogramVec,
    upstream_failures: CounterVec,
    fallbacks_served: Counter,
}

/// Container for HTTP API metrics
struct ApiMetrics {
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

/// Global storage for schema metrics
static SCHEMA_METRICS: OnceLock<SchemaMetrics> = OnceLock::new();

/// Global storage for API metrics
static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = schemagate::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let schema = SchemaMetrics {
        cache_hits: register_counter!(
            "schemagate_cache_hits_total",
            "Total cache lookups that found a document"
        )?,
        cache_misses: register_counter!(
            "schemagate_cache_misses_total",
            "Total cache lookups that found nothing"
        )?,
        cached_documents: register_gauge!(
            "schemagate_cached_documents",
            "Number of schema documents currently cached"
        )?,
        regenerations: register_counter_vec!(
            "schemagate_regenerations_total",
            "Total regenerations by entity type and outcome",
            &["entity_type", "outcome"]
        )?,
        regeneration_duration: register_histogram_vec!(
            "schemagate_regeneration_duration_seconds",
            "Time spent generating, linking and caching one document",
            &["entity_type"],
            vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
        )?,
        upstream_failures: register_counter_vec!(
            "schemagate_upstream_failures_total",
            "Total content source failures by kind",
            &["kind"]
        )?,
        fallbacks_served: register_counter!(
            "schemagate_fallbacks_served_total",
            "Total refreshes answered from the cache after upstream failure"
        )?,
    };

    let api = ApiMetrics {
        api_requests: register_counter_vec!(
            "schemagate_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "schemagate_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
    };

    SCHEMA_METRICS.set(schema).map_err(|_| "Schema metrics already initialized")?;
    API_METRICS.set(api).map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCHEMA_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a cache lookup
pub fn record_cache_lookup(hit: bool) {
    let Some(m) = SCHEMA_METRICS.get() else {
        return;
    };

    if hit {
        m.cache_hits.inc();
    } else {
        m.cache_misses.inc();
    }
}

/// Update the cached document gauge
pub fn update_cached_documents(count: usize) {
    if let Some(m) = SCHEMA_METRICS.get() {
        m.cached_documents.set(count as f64);
    }
}

/// Record a regeneration result
///
/// `outcome` is a cache outcome (`inserted`, `replaced`, `unchanged`, `stale`)
/// or a failure label (`invalid`, `mismatch`, `conflict`).
pub fn record_regeneration(entity_type: &str, outcome: &str) {
    if let Some(m) = SCHEMA_METRICS.get() {
        m.regenerations
            .with_label_values(&[entity_type, outcome])
            .inc();
    }
}

/// Record a content source failure
pub fn record_upstream_failure(kind: &str) {
    if let Some(m) = SCHEMA_METRICS.get() {
        m.upstream_failures.with_label_values(&[kind]).inc();
    }
}

/// Record a refresh answered with the last cached document
pub fn record_fallback_served() {
    if let Some(m) = SCHEMA_METRICS.get() {
        m.fallbacks_served.inc();
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a regeneration timer (returns a timer handle)
pub fn start_regeneration_timer(entity_type: &str) -> MetricsTimer {
    match SCHEMA_METRICS.get() {
        Some(m) => MetricsTimer::new(
            m.regeneration_duration
                .with_label_values(&[entity_type])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
