//! Schema generator
//!
//! Turns a [`ContentEntity`] into a schema.org JSON-LD [`SchemaDocument`].
//! Generation is a pure transformation: the caller supplies the timestamp, and
//! the resulting document is not yet linked to a canonical URL (see
//! [`crate::canonical`]).
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use schemagate::models::{ContentEntity, EntityType};
//! use schemagate::schema::SchemaGenerator;
//!
//! let entity = ContentEntity::new(EntityType::Course, "course-1", 2)
//!     .with_field("name", "Rust 101")
//!     .with_field("description", "Ownership and borrowing");
//!
//! let doc = SchemaGenerator::new().generate(&entity, Utc::now()).unwrap();
//! assert_eq!(doc.body["@type"], "Course");
//! ```

pub mod vocab;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use url::Url;

use crate::models::{is_valid_id, ContentEntity, EntityType, SchemaDocument};
use crate::utils::error::ValidationError;

pub use vocab::{vocabulary, Property, PropertyKind, TypeVocabulary};

/// Default JSON-LD context
pub const SCHEMA_ORG_CONTEXT: &str = "https://schema.org";

/// Generates JSON-LD documents from content entities
#[derive(Debug, Clone)]
pub struct SchemaGenerator {
    context: String,
}

impl Default for SchemaGenerator {
    fn default() -> Self {
        Self {
            context: SCHEMA_ORG_CONTEXT.to_string(),
        }
    }
}

impl SchemaGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `@context` value
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Check an entity without building a document
    pub fn validate(&self, entity: &ContentEntity) -> Result<(), ValidationError> {
        self.build_body(entity).map(|_| ())
    }

    /// Generate the JSON-LD document for an entity
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every missing required field and
    /// every malformed value.
    pub fn generate(
        &self,
        entity: &ContentEntity,
        generated_at: DateTime<Utc>,
    ) -> Result<SchemaDocument, ValidationError> {
        let body = self.build_body(entity)?;
        Ok(SchemaDocument::new(
            entity.key(),
            entity.version,
            Value::Object(body),
            generated_at,
        ))
    }

    fn build_body(&self, entity: &ContentEntity) -> Result<Map<String, Value>, ValidationError> {
        let label = if is_valid_id(&entity.id) {
            entity.key().to_string()
        } else {
            format!("{}/{:?}", entity.entity_type.slug(), entity.id)
        };
        let mut errors = ValidationError::new(label);

        if !is_valid_id(&entity.id) {
            errors.invalid(format!("invalid id {:?}", entity.id));
        }

        let vocab = vocabulary(entity.entity_type);
        let mut body = Map::new();
        body.insert("@context".to_string(), Value::String(self.context.clone()));
        body.insert(
            "@type".to_string(),
            Value::String(entity.entity_type.as_str().to_string()),
        );
        body.insert("identifier".to_string(), Value::String(entity.id.clone()));

        for property in vocab.required {
            match present(entity.fields.get(property.name)) {
                Some(value) => render_into(&mut body, property, value, &mut errors),
                None => errors.missing_field(property.name),
            }
        }

        let mut offer = Map::new();
        for property in vocab.optional {
            let Some(value) = present(entity.fields.get(property.name)) else {
                continue;
            };
            if property.kind == PropertyKind::Offer {
                match render_offer_part(property.name, value) {
                    Ok(v) => {
                        offer.insert(property.name.to_string(), v);
                    }
                    Err(problem) => errors.invalid(problem),
                }
            } else {
                render_into(&mut body, property, value, &mut errors);
            }
        }

        if !offer.is_empty() {
            if !offer.contains_key("price") {
                errors.invalid("offer fields given without 'price'");
            }
            offer.insert("@type".to_string(), Value::String("Offer".to_string()));
            body.insert("offers".to_string(), Value::Object(offer));
        }

        if entity.entity_type == EntityType::Article && !body.contains_key("dateModified") {
            if let Some(updated_at) = entity.updated_at {
                body.insert(
                    "dateModified".to_string(),
                    Value::String(updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                );
            }
        }

        for name in entity.fields.keys() {
            if vocab.property(name).is_none() {
                tracing::debug!(entity = %entity.key(), field = %name, "Dropping unknown field");
            }
        }

        if errors.is_empty() {
            Ok(body)
        } else {
            Err(errors)
        }
    }
}

/// Treat null, blank strings and empty arrays as absent
fn present(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::Array(a)) if a.is_empty() => None,
        Some(v) => Some(v),
    }
}

fn render_into(
    body: &mut Map<String, Value>,
    property: &Property,
    value: &Value,
    errors: &mut ValidationError,
) {
    match render(property, value) {
        Ok(rendered) => {
            body.insert(property.name.to_string(), rendered);
        }
        Err(problem) => errors.invalid(problem),
    }
}

fn render(property: &Property, value: &Value) -> Result<Value, String> {
    let name = property.name;
    match property.kind {
        PropertyKind::Text => text(value)
            .map(Value::String)
            .ok_or_else(|| format!("field '{name}' must be text")),
        PropertyKind::Url => match value {
            Value::String(s) if is_absolute_url(s) => Ok(Value::String(s.trim().to_string())),
            _ => Err(format!("field '{name}' must be an absolute URL")),
        },
        PropertyKind::Date => match value {
            Value::String(s) if is_iso_date(s) => Ok(Value::String(s.trim().to_string())),
            _ => Err(format!("field '{name}' must be an ISO 8601 date")),
        },
        PropertyKind::Node(node_type) => match value {
            Value::String(s) => Ok(json!({ "@type": node_type, "name": s.trim() })),
            Value::Object(map) => {
                let mut node = map.clone();
                node.entry("@type".to_string())
                    .or_insert_with(|| Value::String(node_type.to_string()));
                Ok(Value::Object(node))
            }
            _ => Err(format!("field '{name}' must be a name or an object")),
        },
        PropertyKind::UrlList => {
            let urls: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            urls.into_iter()
                .map(|v| match v {
                    Value::String(s) if is_absolute_url(s) => Ok(Value::String(s.trim().to_string())),
                    _ => Err(format!("field '{name}' must contain absolute URLs")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        PropertyKind::Offer => render_offer_part(name, value),
    }
}

fn render_offer_part(name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "price" => match value {
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                Ok(Value::String(s.trim().to_string()))
            }
            _ => Err("field 'price' must be numeric".to_string()),
        },
        "priceCurrency" => match value {
            Value::String(s)
                if s.trim().len() == 3 && s.trim().chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                Ok(Value::String(s.trim().to_ascii_uppercase()))
            }
            _ => Err("field 'priceCurrency' must be an ISO 4217 code".to_string()),
        },
        "availability" => match value {
            Value::String(s) if is_absolute_url(s) => Ok(Value::String(s.trim().to_string())),
            Value::String(s) => Ok(Value::String(format!("{SCHEMA_ORG_CONTEXT}/{}", s.trim()))),
            _ => Err("field 'availability' must be text".to_string()),
        },
        other => text(value)
            .map(Value::String)
            .ok_or_else(|| format!("field '{other}' must be text")),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_absolute_url(s: &str) -> bool {
    Url::parse(s.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn is_iso_date(s: &str) -> bool {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
