use std::collections::HashSet;

use crate::components::SceneLink;
use crate::ecs::{Entity, StableId, World};
use crate::error::{EcsError, SceneError};

use super::packed::{
    DependencyKind, FORMAT_VERSION, PackedDependency, PackedEntity, PackedRelation, PackedScene, SceneMetadata,
};
use super::registry::ComponentRegistry;

/// Namespace for scene identifiers derived from root identifiers.
const SCENE_NAMESPACE: StableId = StableId::from_u128(0x6872_6166_6e00_4000_8000_7363_656e_6531);

/// Walks live subtrees into [`PackedScene`] documents.
///
/// ```ignore
/// let scene = ScenePacker::new(&registry)
///     .with_name("level_01")
///     .pack(&world, root)?;
/// ```
#[derive(Debug, Clone)]
pub struct ScenePacker<'r> {
    registry: &'r ComponentRegistry,
    name: String,
    scene_id: Option<StableId>,
    metadata: SceneMetadata,
}

impl<'r> ScenePacker<'r> {
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self {
            registry,
            name: String::new(),
            scene_id: None,
            metadata: SceneMetadata::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Without one, the scene id is derived from the root identifiers, so
    /// repacking the same roots yields the same id.
    pub fn with_scene_id(mut self, id: StableId) -> Self {
        self.scene_id = Some(id);
        self
    }

    pub fn with_metadata(mut self, metadata: SceneMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Pack `root` and its subtree.
    pub fn pack(&self, world: &World, root: Entity) -> Result<PackedScene, SceneError> {
        self.pack_roots(world, &[root])
    }

    /// Pack several subtrees into one document, roots in the given order.
    pub fn pack_roots(&self, world: &World, roots: &[Entity]) -> Result<PackedScene, SceneError> {
        for &root in roots {
            if !world.is_valid(root) {
                return Err(EcsError::InvalidHandle(root).into());
            }
        }

        let mut inside = HashSet::new();
        for &root in roots {
            collect_ids(world, root, &mut inside);
        }

        let mut deps = Dependencies::default();
        let entities = roots
            .iter()
            .map(|&root| self.pack_subtree(world, root, &inside, &mut deps))
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.scene_id.unwrap_or_else(|| derive_scene_id(world, roots));
        let scene = PackedScene {
            format_version: FORMAT_VERSION,
            id,
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            entities,
            external_dependencies: deps.list,
        };
        log::debug!(
            "packed {} entities into scene {id} ({} external dependencies)",
            inside.len(),
            scene.external_dependencies.len()
        );
        Ok(scene)
    }

    /// Pack entities depth-first, parents before children, then attach
    /// children bottom-up.
    fn pack_subtree(
        &self,
        world: &World,
        root: Entity,
        inside: &HashSet<StableId>,
        deps: &mut Dependencies,
    ) -> Result<PackedEntity, SceneError> {
        let mut nodes: Vec<(PackedEntity, Option<usize>)> = Vec::new();
        let mut stack = vec![(root, None)];
        while let Some((entity, parent)) = stack.pop() {
            let index = nodes.len();
            nodes.push((self.pack_entity(world, entity, inside, deps)?, parent));
            stack.extend(world.children(entity).iter().rev().map(|&c| (c, Some(index))));
        }

        let mut packed_root = None;
        while let Some((mut node, parent)) = nodes.pop() {
            node.children.reverse();
            match parent {
                Some(parent) => nodes[parent].0.children.push(node),
                None => packed_root = Some(node),
            }
        }
        packed_root.ok_or_else(|| EcsError::InvalidHandle(root).into())
    }

    /// One entity without its children.
    fn pack_entity(
        &self,
        world: &World,
        entity: Entity,
        inside: &HashSet<StableId>,
        deps: &mut Dependencies,
    ) -> Result<PackedEntity, SceneError> {
        let mut packed = PackedEntity::new(world.id(entity)?);
        packed.name = world.name(entity).map(str::to_owned);
        packed.enabled = world.is_enabled(entity);

        for &type_id in world.component_types(entity) {
            let Some(value) = world.get_any(entity, type_id) else {
                continue;
            };
            match self.registry.pack(type_id, value) {
                Some(component) => packed.components.push(component?),
                None if self.registry.is_ignored(type_id) => {}
                None => log::warn!("skipping unregistered component {type_id:?} on {entity}"),
            }
        }
        packed.components.sort_by(|a, b| a.kind.cmp(&b.kind));

        packed.tags = world
            .tags(entity)
            .filter(|tag| !tag.kind.is_transient())
            .cloned()
            .collect();
        packed.tags.sort_by_cached_key(|tag| tag.kind.name().into_owned());

        for (name, relation) in world.relations(entity) {
            if !inside.contains(&relation.target) {
                deps.push(relation.target, DependencyKind::Entity);
            }
            packed.relations.push(PackedRelation {
                name: name.to_owned(),
                target: relation.target,
                payload: relation.payload.clone(),
            });
        }

        if let Some(link) = world.get::<SceneLink>(entity) {
            deps.push(link.scene, DependencyKind::Scene);
        }
        Ok(packed)
    }
}

/// External dependencies, once per identifier, in first-encounter order.
#[derive(Default)]
struct Dependencies {
    seen: HashSet<StableId>,
    list: Vec<PackedDependency>,
}

impl Dependencies {
    fn push(&mut self, id: StableId, kind: DependencyKind) {
        if self.seen.insert(id) {
            self.list.push(PackedDependency { id, kind });
        }
    }
}

fn collect_ids(world: &World, root: Entity, into: &mut HashSet<StableId>) {
    let mut stack = vec![root];
    while let Some(entity) = stack.pop() {
        if let Ok(id) = world.id(entity) {
            into.insert(id);
        }
        stack.extend_from_slice(world.children(entity));
    }
}

fn derive_scene_id(world: &World, roots: &[Entity]) -> StableId {
    let mut bytes = Vec::with_capacity(roots.len() * 16);
    for &root in roots {
        if let Ok(id) = world.id(root) {
            bytes.extend_from_slice(id.as_bytes());
        }
    }
    StableId::derived(SCENE_NAMESPACE, &bytes)
}
