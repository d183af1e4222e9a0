//! Per-type schema.org vocabulary tables
//!
//! Each supported [`EntityType`] declares which entity fields are required,
//! which are optional, and how each field value is shaped in the JSON-LD output.

use crate::models::EntityType;

/// How a field value is rendered into JSON-LD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Plain text; numbers and booleans are stringified
    Text,
    /// Absolute URL
    Url,
    /// ISO 8601 date or date-time
    Date,
    /// Nested node of the given schema.org type; a bare string becomes its `name`
    Node(&'static str),
    /// One URL or a list of URLs
    UrlList,
    /// Folded into a single `offers` node of type `Offer`
    Offer,
}

/// A single vocabulary property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    /// Entity field name, identical to the schema.org property name
    pub name: &'static str,
    pub kind: PropertyKind,
}

const fn prop(name: &'static str, kind: PropertyKind) -> Property {
    Property { name, kind }
}

use PropertyKind::{Date, Node, Offer, Text, Url, UrlList};

/// Vocabulary for one entity type
#[derive(Debug, Clone, Copy)]
pub struct TypeVocabulary {
    pub entity_type: EntityType,
    pub required: &'static [Property],
    pub optional: &'static [Property],
}

impl TypeVocabulary {
    /// Look up a property by field name
    pub fn property(&self, name: &str) -> Option<&'static Property> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .find(|p| p.name == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|p| p.name == name)
    }
}

static COURSE: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::Course,
    required: &[prop("name", Text), prop("description", Text)],
    optional: &[
        prop("provider", Node("Organization")),
        prop("courseCode", Text),
        prop("inLanguage", Text),
        prop("educationalLevel", Text),
        prop("timeRequired", Text),
        prop("image", Url),
    ],
};

static PRODUCT: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::Product,
    required: &[prop("name", Text)],
    optional: &[
        prop("description", Text),
        prop("sku", Text),
        prop("gtin", Text),
        prop("brand", Node("Brand")),
        prop("image", Url),
        prop("price", Offer),
        prop("priceCurrency", Offer),
        prop("availability", Offer),
    ],
};

static ARTICLE: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::Article,
    required: &[prop("headline", Text)],
    optional: &[
        prop("description", Text),
        prop("author", Node("Person")),
        prop("publisher", Node("Organization")),
        prop("datePublished", Date),
        prop("dateModified", Date),
        prop("image", Url),
    ],
};

static EVENT: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::Event,
    required: &[prop("name", Text), prop("startDate", Date)],
    optional: &[
        prop("endDate", Date),
        prop("description", Text),
        prop("location", Node("Place")),
        prop("eventStatus", Text),
        prop("image", Url),
    ],
};

static ORGANIZATION: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::Organization,
    required: &[prop("name", Text)],
    optional: &[
        prop("description", Text),
        prop("logo", Url),
        prop("sameAs", UrlList),
    ],
};

static PERSON: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::Person,
    required: &[prop("name", Text)],
    optional: &[
        prop("jobTitle", Text),
        prop("affiliation", Node("Organization")),
        prop("sameAs", UrlList),
        prop("image", Url),
    ],
};

static WEB_PAGE: TypeVocabulary = TypeVocabulary {
    entity_type: EntityType::WebPage,
    required: &[prop("name", Text)],
    optional: &[prop("description", Text), prop("inLanguage", Text)],
};

/// Vocabulary for an entity type
pub fn vocabulary(entity_type: EntityType) -> &'static TypeVocabulary {
    match entity_type {
        EntityType::Course => &COURSE,
        EntityType::Product => &PRODUCT,
        EntityType::Article => &ARTICLE,
        EntityType::Event => &EVENT,
        EntityType::Organization => &ORGANIZATION,
        EntityType::Person => &PERSON,
        EntityType::WebPage => &WEB_PAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_vocabulary() {
        for t in EntityType::all() {
            let vocab = vocabulary(t);
            assert_eq!(vocab.entity_type, t);
            assert!(!vocab.required.is_empty(), "{t} has no required fields");
        }
    }

    #[test]
    fn test_property_lookup() {
        let course = vocabulary(EntityType::Course);
        assert!(course.is_required("name"));
        assert!(!course.is_required("provider"));
        assert_eq!(
            course.property("provider").map(|p| p.kind),
            Some(Node("Organization"))
        );
        assert!(course.property("sku").is_none());
    }
}
