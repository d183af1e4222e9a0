//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use schemagate::models::{ContentEntity, EntityKey, EntityType};
use schemagate::router::EndpointLayout;
use schemagate::service::{SchemaService, ServiceOptions};
use schemagate::upstream::{ContentSource, StaticContentSource};
use schemagate::utils::error::UpstreamError;
use schemagate::utils::retry::RetryConfig;

pub const ORIGIN: &str = "https://example.com";

pub fn site() -> Url {
    Url::parse(ORIGIN).unwrap()
}

/// A valid course entity
pub fn course(id: &str, version: u64) -> ContentEntity {
    ContentEntity::new(EntityType::Course, id, version)
        .with_field("name", format!("Course {id}"))
        .with_field("description", format!("Revision {version}"))
}

pub fn course_key(id: &str) -> EntityKey {
    EntityKey::new(EntityType::Course, id)
}

/// Options with short timeouts and near-zero backoff
pub fn fast_options() -> ServiceOptions {
    ServiceOptions {
        retry: RetryConfig::with_delays(2, 1, 5),
        fetch_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

pub fn service_with(source: Arc<dyn ContentSource>, layout: EndpointLayout) -> SchemaService {
    SchemaService::new(site(), layout, source).with_options(fast_options())
}

pub fn static_service(entities: Vec<ContentEntity>) -> SchemaService {
    service_with(
        Arc::new(StaticContentSource::from_entities(entities)),
        EndpointLayout::default(),
    )
}

/// Content source that can be switched into a failing state
pub struct FlakySource {
    inner: StaticContentSource,
    failing: AtomicBool,
    hanging: AtomicBool,
    calls: AtomicU32,
}

impl FlakySource {
    pub fn new(entities: Vec<ContentEntity>) -> Self {
        Self {
            inner: StaticContentSource::from_entities(entities),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Never answer, so every read runs into the fetch timeout
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn upsert(&self, entity: ContentEntity) {
        self.inner.upsert(entity);
    }

    pub fn remove(&self, key: &EntityKey) {
        self.inner.remove(key);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FlakySource {
    async fn fetch(&self, key: &EntityKey) -> Result<ContentEntity, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Server(503));
        }
        self.inner.fetch(key).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}
