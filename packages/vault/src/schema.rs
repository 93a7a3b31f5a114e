//! Known-property registry
//!
//! Decides which top-level properties of an entity are part of the document
//! model and which are vendor extensions. The registry itself is owned by an
//! external schema provider; the vault only consumes it through
//! [`PropertySchema`].

use crate::model::EntityKind;
use std::collections::{HashMap, HashSet};

pub trait PropertySchema {
    /// Whether `property` is a recognized property of `kind`
    fn is_known(&self, kind: EntityKind, property: &str) -> bool;
}

const DESCRIPTIVE: &[&str] = &[
    "@context",
    "label",
    "metadata",
    "summary",
    "requiredStatement",
    "rights",
    "navDate",
    "navPlace",
    "language",
    "provider",
    "thumbnail",
    "placeholderCanvas",
    "accompanyingCanvas",
    "behavior",
    "homepage",
    "logo",
    "rendering",
    "service",
    "services",
    "seeAlso",
    "partOf",
    "annotations",
];

const COLLECTION: &[&str] = &["viewingDirection"];
const MANIFEST: &[&str] = &["viewingDirection", "start"];
const CANVAS: &[&str] = &["height", "width", "duration"];
const RANGE: &[&str] = &["items", "viewingDirection", "start", "supplementary"];
const ANNOTATION_PAGE: &[&str] = &["next", "prev", "first", "last", "total", "startIndex"];
const ANNOTATION: &[&str] = &[
    "motivation",
    "body",
    "target",
    "timeMode",
    "stylesheet",
    "created",
    "creator",
    "modified",
];

/// Presentation-3 style allowlist, extensible per kind
#[derive(Debug, Clone)]
pub struct PresentationSchema {
    known: HashMap<EntityKind, HashSet<String>>,
}

impl PresentationSchema {
    pub fn new() -> Self {
        let mut known = HashMap::new();
        for kind in EntityKind::ALL {
            let specific = match kind {
                EntityKind::Collection => COLLECTION,
                EntityKind::Manifest => MANIFEST,
                EntityKind::Canvas => CANVAS,
                EntityKind::Range => RANGE,
                EntityKind::AnnotationPage => ANNOTATION_PAGE,
                EntityKind::Annotation => ANNOTATION,
            };
            let names: HashSet<String> = DESCRIPTIVE
                .iter()
                .chain(specific)
                .map(|name| name.to_string())
                .collect();
            known.insert(kind, names);
        }
        Self { known }
    }

    /// Add a property the external provider considers part of `kind`
    pub fn with_property(mut self, kind: EntityKind, property: impl Into<String>) -> Self {
        self.add_property(kind, property);
        self
    }

    pub fn add_property(&mut self, kind: EntityKind, property: impl Into<String>) {
        self.known.entry(kind).or_default().insert(property.into());
    }

    pub fn known_properties(&self, kind: EntityKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .known
            .get(&kind)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

impl Default for PresentationSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySchema for PresentationSchema {
    fn is_known(&self, kind: EntityKind, property: &str) -> bool {
        self.known
            .get(&kind)
            .map(|set| set.contains(property))
            .unwrap_or(false)
    }
}
