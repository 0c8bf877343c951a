//! The packed document: plain data, no behavior beyond traversal and the
//! JSON helpers.
//!
//! In memory a document is a tree of [`PackedEntity`] values. On disk the
//! tree is flattened into one entity list with children referenced by
//! index, so nesting in the JSON stays constant however deep the hierarchy
//! goes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ecs::{StableId, Tag};
use crate::error::SceneError;

/// Document format written by this version of the packer.
pub const FORMAT_VERSION: u32 = 1;

/// A packed entity subtree, the unit of persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedScene {
    pub format_version: u32,
    pub id: StableId,
    pub name: String,
    pub metadata: SceneMetadata,
    /// Root entities, in the order they were packed.
    pub entities: Vec<PackedEntity>,
    pub external_dependencies: Vec<PackedDependency>,
}

impl PackedScene {
    /// An empty document at the current format version.
    pub fn new(id: StableId, name: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            id,
            name: name.into(),
            metadata: SceneMetadata::default(),
            entities: Vec::new(),
            external_dependencies: Vec::new(),
        }
    }

    /// Every packed entity, depth-first, parents before children.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.entities.iter().rev().collect(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.walk().count()
    }

    /// Whether an entity with `id` is packed in this document.
    pub fn contains(&self, id: StableId) -> bool {
        self.walk().any(|e| e.id == id)
    }

    pub fn find(&self, id: StableId) -> Option<&PackedEntity> {
        self.walk().find(|e| e.id == id)
    }

    pub fn root_ids(&self) -> Vec<StableId> {
        self.entities.iter().map(|e| e.id).collect()
    }
}

/// Author and tool versions. Carried through unchanged; nothing reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_version: Option<String>,
    /// Free-form timestamp, typically RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackedEntity {
    /// Nil means "assign a fresh identifier on unpack".
    pub id: StableId,
    pub name: Option<String>,
    pub enabled: bool,
    /// Sorted by kind name.
    pub components: Vec<PackedComponent>,
    /// Sorted by tag name.
    pub tags: Vec<Tag>,
    /// Sorted by relation name.
    pub relations: Vec<PackedRelation>,
    /// In the store's sibling order.
    pub children: Vec<PackedEntity>,
}

impl PackedEntity {
    pub fn new(id: StableId) -> Self {
        Self {
            id,
            name: None,
            enabled: true,
            components: Vec::new(),
            tags: Vec::new(),
            relations: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn component(&self, kind: &str) -> Option<&serde_json::Value> {
        self.components.iter().find(|c| c.kind == kind).map(|c| &c.data)
    }
}

/// One component by value, keyed by its registered name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedComponent {
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedRelation {
    pub name: String,
    pub target: StableId,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

/// An identifier referenced from the document but not packed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackedDependency {
    pub id: StableId,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// A relation target living in another scene.
    Entity,
    /// A whole scene named by a [`SceneLink`](crate::components::SceneLink).
    Scene,
}

/// Depth-first iterator over a document's entities.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<&'a PackedEntity>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a PackedEntity;

    fn next(&mut self) -> Option<Self::Item> {
        let entity = self.stack.pop()?;
        self.stack.extend(entity.children.iter().rev());
        Some(entity)
    }
}

// ── Wire form ────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct SceneDocument {
    format_version: u32,
    id: StableId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    metadata: SceneMetadata,
    /// Depth-first, parents before children. Entities no other entity lists
    /// as a child are the roots, in list order.
    entities: Vec<DocumentEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    external_dependencies: Vec<PackedDependency>,
}

#[derive(Serialize, Deserialize)]
struct DocumentEntity {
    id: StableId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    components: Vec<PackedComponent>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    relations: Vec<PackedRelation>,
    /// Indices into the document's entity list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<usize>,
}

fn enabled_by_default() -> bool {
    true
}

impl DocumentEntity {
    fn from_packed(entity: &PackedEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            enabled: entity.enabled,
            components: entity.components.clone(),
            tags: entity.tags.clone(),
            relations: entity.relations.clone(),
            children: Vec::new(),
        }
    }

    fn into_packed(self, children: Vec<PackedEntity>) -> PackedEntity {
        PackedEntity {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            components: self.components,
            tags: self.tags,
            relations: self.relations,
            children,
        }
    }
}

impl From<&PackedScene> for SceneDocument {
    fn from(scene: &PackedScene) -> Self {
        let mut entities: Vec<DocumentEntity> = Vec::new();
        let mut stack: Vec<(&PackedEntity, Option<usize>)> = scene.entities.iter().rev().map(|e| (e, None)).collect();
        while let Some((entity, parent)) = stack.pop() {
            let index = entities.len();
            entities.push(DocumentEntity::from_packed(entity));
            if let Some(parent) = parent {
                entities[parent].children.push(index);
            }
            stack.extend(entity.children.iter().rev().map(|c| (c, Some(index))));
        }
        Self {
            format_version: scene.format_version,
            id: scene.id,
            name: scene.name.clone(),
            metadata: scene.metadata.clone(),
            entities,
            external_dependencies: scene.external_dependencies.clone(),
        }
    }
}

impl TryFrom<SceneDocument> for PackedScene {
    type Error = SceneError;

    /// Rebuild the tree bottom-up. Every entity must be listed as a child at
    /// most once and be reachable from a root.
    fn try_from(doc: SceneDocument) -> Result<Self, SceneError> {
        let count = doc.entities.len();
        let mut referenced = vec![false; count];
        for (index, entity) in doc.entities.iter().enumerate() {
            for &child in &entity.children {
                if child >= count || child == index || std::mem::replace(&mut referenced[child], true) {
                    return Err(SceneError::MalformedDocument(format!(
                        "entity {index} lists invalid child {child}"
                    )));
                }
            }
        }
        let roots: Vec<usize> = (0..count).filter(|&i| !referenced[i]).collect();

        let mut pending: Vec<Option<DocumentEntity>> = doc.entities.into_iter().map(Some).collect();
        let mut built: Vec<Option<PackedEntity>> = (0..count).map(|_| None).collect();
        let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();
        let mut visited = 0;
        while let Some((index, expanded)) = stack.pop() {
            if !expanded {
                visited += 1;
                stack.push((index, true));
                if let Some(entity) = &pending[index] {
                    stack.extend(entity.children.iter().rev().map(|&c| (c, false)));
                }
                continue;
            }
            let Some(entity) = pending[index].take() else {
                continue;
            };
            let children: Vec<PackedEntity> = entity.children.iter().filter_map(|&c| built[c].take()).collect();
            built[index] = Some(entity.into_packed(children));
        }
        if visited != count {
            return Err(SceneError::MalformedDocument(
                "child references form a cycle".into(),
            ));
        }

        Ok(PackedScene {
            format_version: doc.format_version,
            id: doc.id,
            name: doc.name,
            metadata: doc.metadata,
            entities: roots.iter().filter_map(|&r| built[r].take()).collect(),
            external_dependencies: doc.external_dependencies,
        })
    }
}

impl Serialize for PackedScene {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SceneDocument::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PackedScene {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        SceneDocument::deserialize(deserializer)?
            .try_into()
            .map_err(serde::de::Error::custom)
    }
}

// ── JSON ─────────────────────────────────────────────────────────────────

pub fn to_json_string(scene: &PackedScene) -> Result<String, SceneError> {
    Ok(serde_json::to_string_pretty(scene)?)
}

/// Parse a document. Text that is not a scene at all is reported as
/// [`SceneError::MalformedDocument`].
pub fn from_json_str(json: &str) -> Result<PackedScene, SceneError> {
    serde_json::from_str(json).map_err(|err| SceneError::MalformedDocument(err.to_string()))
}

pub fn write_scene_file(scene: &PackedScene, path: impl AsRef<Path>) -> Result<(), SceneError> {
    let path = path.as_ref();
    std::fs::write(path, to_json_string(scene)?)?;
    log::debug!("wrote scene {} to {}", scene.id, path.display());
    Ok(())
}

pub fn read_scene_file(path: impl AsRef<Path>) -> Result<PackedScene, SceneError> {
    let json = std::fs::read_to_string(path)?;
    from_json_str(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::TagKind;

    fn sample() -> PackedScene {
        let mut scene = PackedScene::new(StableId::from_u128(100), "sample");
        let mut root = PackedEntity::new(StableId::from_u128(1));
        let mut child = PackedEntity::new(StableId::from_u128(2));
        child.children.push(PackedEntity::new(StableId::from_u128(3)));
        root.children.push(child);
        root.children.push(PackedEntity::new(StableId::from_u128(4)));
        root.tags.push(Tag::new(TagKind::PxStatic));
        scene.entities.push(root);
        scene.entities.push(PackedEntity::new(StableId::from_u128(5)));
        scene
    }

    #[test]
    fn walk_is_depth_first_in_sibling_order() {
        let order: Vec<u128> = sample().walk().map(|e| e.id.as_u128()).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn contains_and_find() {
        let scene = sample();
        assert_eq!(scene.entity_count(), 5);
        assert!(scene.contains(StableId::from_u128(3)));
        assert!(!scene.contains(StableId::from_u128(9)));
        assert!(scene.find(StableId::from_u128(4)).unwrap().children.is_empty());
    }

    #[test]
    fn json_omits_empty_optionals() {
        let json = to_json_string(&PackedScene::new(StableId::from_u128(7), "bare")).unwrap();
        assert!(!json.contains("external_dependencies"));
        assert!(!json.contains("author"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let json = r#"{
            "format_version": 1,
            "id": "00000000-0000-0000-0000-000000000001",
            "entities": [{ "id": "00000000-0000-0000-0000-000000000002" }]
        }"#;
        let scene = from_json_str(json).unwrap();
        assert!(scene.entities[0].enabled);
        assert!(scene.name.is_empty());
    }

    #[test]
    fn entities_are_stored_flat_with_child_indices() {
        let json = to_json_string(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entities = value["entities"].as_array().unwrap();
        assert_eq!(entities.len(), 5);
        assert_eq!(entities[0]["children"], serde_json::json!([1, 3]));
        assert_eq!(entities[1]["children"], serde_json::json!([2]));
        assert!(entities[4].get("children").is_none());
    }

    #[test]
    fn deep_chain_survives_json() {
        let mut node = PackedEntity::new(StableId::from_u128(500));
        for i in (1..500).rev() {
            let mut parent = PackedEntity::new(StableId::from_u128(i));
            parent.children.push(node);
            node = parent;
        }
        let mut scene = PackedScene::new(StableId::from_u128(1000), "deep");
        scene.entities.push(node);

        let reread = from_json_str(&to_json_string(&scene).unwrap()).unwrap();
        assert_eq!(reread.entity_count(), 500);
        let ids: Vec<u128> = reread.walk().map(|e| e.id.as_u128()).collect();
        assert_eq!(ids, (1..=500).collect::<Vec<_>>());
    }

    #[test]
    fn bad_child_references_are_malformed() {
        let id = |n: u128| StableId::from_u128(n).to_string();
        let doc = |children_a: &str, children_b: &str| {
            format!(
                r#"{{
                    "format_version": 1,
                    "id": "{}",
                    "entities": [
                        {{ "id": "{}", "children": {children_a} }},
                        {{ "id": "{}", "children": {children_b} }}
                    ]
                }}"#,
                id(9),
                id(1),
                id(2)
            )
        };
        for (a, b) in [("[5]", "[]"), ("[0]", "[]"), ("[1]", "[0]"), ("[1, 1]", "[]")] {
            let err = from_json_str(&doc(a, b)).unwrap_err();
            assert!(err.is_malformed(), "{a} {b}");
        }
        assert_eq!(from_json_str(&doc("[1]", "[]")).unwrap().entities.len(), 1);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = from_json_str("{ \"entities\": 3 }").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.scene.json");
        let scene = sample();
        write_scene_file(&scene, &path).unwrap();
        assert_eq!(read_scene_file(&path).unwrap(), scene);
    }
}
