//! # Entity Model
//!
//! Canonical shapes for the six entity kinds and the flat state container.
//!
//! ## Layout
//!
//! ```text
//! VaultState
//!  ├─ entities            kind → (id → Entity)
//!  ├─ type_index          id → kind
//!  ├─ references          parent → [child, ...]      (ownership, ordered)
//!  ├─ reverse_refs        child → parent
//!  ├─ collection_members  collection → [member, ...] (many-to-many)
//!  ├─ member_of_collections member → [collection, ...]
//!  ├─ reference_labels    collection → (member → label)
//!  ├─ root_id
//!  ├─ extensions          id → vendor properties
//!  └─ trashed_entities    id → TrashedEntity
//! ```
//!
//! Every index sits behind an `Arc`. Operations clone only the indices they
//! actually change (via `Arc::make_mut`), so an older state stays valid and
//! shares everything untouched with its successor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type EntityId = String;

/// JSON object used for entity properties and extension bags
pub type Properties = Map<String, Value>;

/// Ordered child (or member) id list, shared between states until edited
pub type IdList = Arc<Vec<EntityId>>;

pub type Bucket = HashMap<EntityId, Arc<Entity>>;

/// Labels a collection's bare references carried, by member id. `None`
/// means the reference had no label at all.
pub type ReferenceLabels = HashMap<EntityId, Option<Value>>;

/// The six entity kinds of the archive document model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Collection,
    Manifest,
    Canvas,
    Range,
    AnnotationPage,
    Annotation,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Collection,
        EntityKind::Manifest,
        EntityKind::Canvas,
        EntityKind::Range,
        EntityKind::AnnotationPage,
        EntityKind::Annotation,
    ];

    /// The `type` tag used in documents
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Collection => "Collection",
            EntityKind::Manifest => "Manifest",
            EntityKind::Canvas => "Canvas",
            EntityKind::Range => "Range",
            EntityKind::AnnotationPage => "AnnotationPage",
            EntityKind::Annotation => "Annotation",
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        EntityKind::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// Property names that carry owned children for this kind
    pub fn child_slots(self) -> &'static [&'static str] {
        match self {
            EntityKind::Collection => &["items"],
            EntityKind::Manifest => &["items", "structures"],
            EntityKind::Canvas => &["items"],
            EntityKind::AnnotationPage => &["items"],
            EntityKind::Range | EntityKind::Annotation => &[],
        }
    }

    pub fn is_child_slot(self, property: &str) -> bool {
        self.child_slots().contains(&property)
    }

    /// Slot under which a child of `child` kind is owned, if ownership is allowed
    pub fn slot_for(self, child: EntityKind) -> Option<&'static str> {
        match (self, child) {
            (EntityKind::Collection, EntityKind::Collection | EntityKind::Manifest) => Some("items"),
            (EntityKind::Manifest, EntityKind::Canvas) => Some("items"),
            (EntityKind::Manifest, EntityKind::Range) => Some("structures"),
            (EntityKind::Canvas, EntityKind::AnnotationPage) => Some("items"),
            (EntityKind::AnnotationPage, EntityKind::Annotation) => Some("items"),
            _ => None,
        }
    }

    pub fn can_own(self, child: EntityKind) -> bool {
        self.slot_for(child).is_some()
    }

    /// Whether entities of this kind may be referenced as collection members
    pub fn is_collectable(self) -> bool {
        matches!(self, EntityKind::Collection | EntityKind::Manifest)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized entity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    #[serde(rename = "type")]
    pub kind: EntityKind,

    /// Known properties other than `id` and `type`
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Properties,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn label(&self) -> Option<&Value> {
        self.property("label")
    }
}

/// Per-kind entity storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBuckets {
    #[serde(rename = "Collection", default)]
    pub collections: Arc<Bucket>,

    #[serde(rename = "Manifest", default)]
    pub manifests: Arc<Bucket>,

    #[serde(rename = "Canvas", default)]
    pub canvases: Arc<Bucket>,

    #[serde(rename = "Range", default)]
    pub ranges: Arc<Bucket>,

    #[serde(rename = "AnnotationPage", default)]
    pub annotation_pages: Arc<Bucket>,

    #[serde(rename = "Annotation", default)]
    pub annotations: Arc<Bucket>,
}

impl EntityBuckets {
    pub fn bucket(&self, kind: EntityKind) -> &Bucket {
        self.slot(kind)
    }

    /// Copy-on-write access to one bucket; the other five stay shared
    pub fn bucket_mut(&mut self, kind: EntityKind) -> &mut Bucket {
        let slot = match kind {
            EntityKind::Collection => &mut self.collections,
            EntityKind::Manifest => &mut self.manifests,
            EntityKind::Canvas => &mut self.canvases,
            EntityKind::Range => &mut self.ranges,
            EntityKind::AnnotationPage => &mut self.annotation_pages,
            EntityKind::Annotation => &mut self.annotations,
        };
        Arc::make_mut(slot)
    }

    fn slot(&self, kind: EntityKind) -> &Arc<Bucket> {
        match kind {
            EntityKind::Collection => &self.collections,
            EntityKind::Manifest => &self.manifests,
            EntityKind::Canvas => &self.canvases,
            EntityKind::Range => &self.ranges,
            EntityKind::AnnotationPage => &self.annotation_pages,
            EntityKind::Annotation => &self.annotations,
        }
    }

    pub(crate) fn shares_bucket_with(&self, other: &EntityBuckets, kind: EntityKind) -> bool {
        Arc::ptr_eq(self.slot(kind), other.slot(kind))
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Arc<Entity>> {
        self.bucket(kind).get(id)
    }

    pub fn len(&self) -> usize {
        EntityKind::ALL.iter().map(|kind| self.bucket(*kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &Arc<Entity>)> {
        EntityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.bucket(kind).values().map(move |entity| (kind, entity)))
    }
}

/// Snapshot of one descendant inside a trashed subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashedNode {
    pub entity: Entity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Properties>,

    #[serde(default)]
    pub child_ids: Vec<EntityId>,

    #[serde(default)]
    pub member_of_collections: Vec<EntityId>,

    /// Position inside each collection's member list at deletion time
    #[serde(default)]
    pub membership_positions: HashMap<EntityId, usize>,

    /// Members of this node when it is a Collection
    #[serde(default)]
    pub collection_members: Vec<EntityId>,

    /// Reference labels this node recorded for its own members
    #[serde(default)]
    pub member_labels: ReferenceLabels,

    /// Reference labels other collections recorded for this node
    #[serde(default)]
    pub listed_labels: ReferenceLabels,
}

/// Everything needed to restore a soft-deleted subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashedEntity {
    pub entity: Entity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Properties>,

    pub original_parent_id: Option<EntityId>,

    /// Position among the original parent's children at deletion time
    pub original_index: Option<usize>,

    pub trashed_at: DateTime<Utc>,

    #[serde(default)]
    pub member_of_collections: Vec<EntityId>,

    #[serde(default)]
    pub membership_positions: HashMap<EntityId, usize>,

    #[serde(default)]
    pub collection_members: Vec<EntityId>,

    #[serde(default)]
    pub member_labels: ReferenceLabels,

    #[serde(default)]
    pub listed_labels: ReferenceLabels,

    #[serde(default)]
    pub child_ids: Vec<EntityId>,

    #[serde(default)]
    pub was_root: bool,

    /// Ownership-subtree descendants in pre-order
    #[serde(default)]
    pub descendants: Vec<TrashedNode>,
}

impl TrashedEntity {
    /// Ids of the trashed root followed by all its descendants
    pub fn subtree_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.entity.id.as_str())
            .chain(self.descendants.iter().map(|node| node.entity.id.as_str()))
    }
}

/// The normalized store: single source of truth for the archive graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultState {
    #[serde(default)]
    pub entities: EntityBuckets,

    #[serde(default)]
    pub type_index: Arc<HashMap<EntityId, EntityKind>>,

    #[serde(default)]
    pub references: Arc<HashMap<EntityId, IdList>>,

    #[serde(default)]
    pub reverse_refs: Arc<HashMap<EntityId, EntityId>>,

    #[serde(default)]
    pub collection_members: Arc<HashMap<EntityId, IdList>>,

    #[serde(default)]
    pub member_of_collections: Arc<HashMap<EntityId, IdList>>,

    /// Reference labels that differ from the member's own label
    #[serde(default)]
    pub reference_labels: Arc<HashMap<EntityId, Arc<ReferenceLabels>>>,

    #[serde(default)]
    pub root_id: Option<EntityId>,

    #[serde(default)]
    pub extensions: Arc<HashMap<EntityId, Arc<Properties>>>,

    #[serde(default)]
    pub trashed_entities: Arc<HashMap<EntityId, Arc<TrashedEntity>>>,
}

impl VaultState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Remove `id` from an ordered list, dropping the map entry when it empties.
/// Returns true when the list changed.
pub(crate) fn detach_id(map: &mut HashMap<EntityId, IdList>, key: &str, id: &str) -> bool {
    let Some(list) = map.get_mut(key) else {
        return false;
    };
    let Some(pos) = list.iter().position(|existing| existing == id) else {
        return false;
    };
    if list.len() == 1 {
        map.remove(key);
    } else {
        Arc::make_mut(list).remove(pos);
    }
    true
}

/// Insert `id` into the list under `key` at `index` (clamped) or at the end
pub(crate) fn attach_id(
    map: &mut HashMap<EntityId, IdList>,
    key: &str,
    id: EntityId,
    index: Option<usize>,
) {
    let list = Arc::make_mut(map.entry(key.to_string()).or_default());
    match index {
        Some(index) => list.insert(index.min(list.len()), id),
        None => list.push(id),
    }
}
