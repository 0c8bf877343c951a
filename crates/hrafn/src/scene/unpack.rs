use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use crate::ecs::component::BoxedComponent;
use crate::ecs::{Entity, Relation, StableId, Tag, TagKind, World};
use crate::error::{EcsError, SceneError};

use super::packed::{FORMAT_VERSION, PackedEntity, PackedScene};
use super::registry::ComponentRegistry;

/// What identifiers unpacked entities receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdPolicy {
    /// Reuse the packed identifiers. A clash with a live entity fails the
    /// whole unpack.
    #[default]
    Preserve,
    /// Give every entity a fresh identifier and remap relation targets that
    /// point inside the document. For instancing one document many times.
    Regenerate,
}

/// Entities created by one unpack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackedScene {
    /// One per packed root, in document order.
    pub roots: Vec<Entity>,
    /// Every created entity, in creation order (depth-first).
    pub entities: Vec<Entity>,
}

impl UnpackedScene {
    /// The first root. Single-root documents come from [`ScenePacker::pack`](super::ScenePacker::pack).
    pub fn root(&self) -> Option<Entity> {
        self.roots.first().copied()
    }
}

/// Rebuilds live entities from a [`PackedScene`].
///
/// Unpacking is all-or-nothing: the document is validated and every
/// component decoded before anything is created, and if a later step
/// fails (a tag hook refusing, say) every entity created so far is
/// destroyed again in reverse creation order. A packed `ActiveCamera` is
/// applied after every other tag, and a camera it displaced is handed the
/// tag back on rollback.
#[derive(Debug, Clone)]
pub struct SceneUnpacker<'r> {
    registry: &'r ComponentRegistry,
    parent: Option<Entity>,
    policy: IdPolicy,
}

impl<'r> SceneUnpacker<'r> {
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self {
            registry,
            parent: None,
            policy: IdPolicy::default(),
        }
    }

    /// Attach the unpacked roots under `parent` instead of leaving them as
    /// world roots.
    pub fn with_parent(mut self, parent: Entity) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_id_policy(mut self, policy: IdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn unpack(&self, world: &mut World, scene: &PackedScene) -> Result<UnpackedScene, SceneError> {
        if scene.format_version != FORMAT_VERSION {
            return Err(SceneError::UnsupportedVersion {
                found: scene.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if let Some(parent) = self.parent {
            if !world.is_valid(parent) {
                return Err(EcsError::InvalidHandle(parent).into());
            }
        }

        let remap = self.plan_ids(world, scene)?;
        let mut decoded = scene
            .walk()
            .map(|packed| {
                packed
                    .components
                    .iter()
                    .map(|c| self.registry.unpack(c))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();

        let cameras: Vec<(Entity, Tag)> = world
            .tagged(&TagKind::ActiveCamera)
            .into_iter()
            .filter_map(|e| Some((e, world.tag(e, &TagKind::ActiveCamera)?.clone())))
            .collect();

        let mut out = UnpackedScene::default();
        let result = self.build(world, scene, &remap, &mut decoded, &mut out);
        if let Err(err) = result {
            log::warn!(
                "unpacking scene {} failed, rolling back {} entities: {err}",
                scene.id,
                out.entities.len()
            );
            rollback(world, &out.entities, cameras);
            return Err(err);
        }

        log::debug!("unpacked scene {} ({} entities)", scene.id, out.entities.len());
        Ok(out)
    }

    /// Check identifiers and decide the ones to assign. The returned map
    /// holds the packed → live identifier for every entity that changes.
    fn plan_ids(&self, world: &World, scene: &PackedScene) -> Result<HashMap<StableId, StableId>, SceneError> {
        let mut seen = HashSet::new();
        let mut remap = HashMap::new();
        for packed in scene.walk() {
            if packed.id.is_nil() {
                continue;
            }
            if !seen.insert(packed.id) {
                return Err(SceneError::DuplicateIdentifier(packed.id));
            }
            match self.policy {
                IdPolicy::Preserve if world.resolve(packed.id).is_some() => {
                    return Err(EcsError::IdentifierInUse(packed.id).into());
                }
                IdPolicy::Preserve => {}
                IdPolicy::Regenerate => {
                    remap.insert(packed.id, world.ids().allocate());
                }
            }
        }
        Ok(remap)
    }

    fn build(
        &self,
        world: &mut World,
        scene: &PackedScene,
        remap: &HashMap<StableId, StableId>,
        decoded: &mut impl Iterator<Item = Vec<(TypeId, BoxedComponent)>>,
        out: &mut UnpackedScene,
    ) -> Result<(), SceneError> {
        for packed in &scene.entities {
            let root = create(world, packed, self.parent, remap, decoded, &mut out.entities)?;
            out.roots.push(root);
        }

        // Tags last, so physics bindings see every component already in place.
        let mut cameras = Vec::new();
        for (packed, &entity) in scene.walk().zip(&out.entities) {
            for tag in &packed.tags {
                if tag.kind == TagKind::ActiveCamera {
                    cameras.push((entity, tag.clone()));
                } else {
                    world.add_tag(entity, tag.clone())?;
                }
            }
            for relation in &packed.relations {
                let target = remap.get(&relation.target).copied().unwrap_or(relation.target);
                world.add_relation(
                    entity,
                    relation.name.clone(),
                    Relation::new(target).with_payload(relation.payload.clone()),
                )?;
            }
        }
        for (entity, tag) in cameras {
            world.add_tag(entity, tag)?;
        }
        Ok(())
    }
}

/// Destroy `created` newest first, then give `ActiveCamera` back to the
/// entities that held it before the unpack.
fn rollback(world: &mut World, created: &[Entity], cameras: Vec<(Entity, Tag)>) {
    for &entity in created.iter().rev() {
        if world.is_valid(entity) {
            if let Err(err) = world.destroy_entity(entity) {
                log::warn!("rollback could not destroy {entity}: {err}");
            }
        }
    }
    for (entity, tag) in cameras {
        if world.is_valid(entity) && !world.has_tag(entity, &TagKind::ActiveCamera) {
            if let Err(err) = world.add_tag(entity, tag) {
                log::warn!("rollback could not restore ActiveCamera on {entity}: {err}");
            }
        }
    }
}

/// Create `packed` and its subtree depth-first, parents before children,
/// consuming one decoded component list per entity.
fn create(
    world: &mut World,
    packed: &PackedEntity,
    parent: Option<Entity>,
    remap: &HashMap<StableId, StableId>,
    decoded: &mut impl Iterator<Item = Vec<(TypeId, BoxedComponent)>>,
    created: &mut Vec<Entity>,
) -> Result<Entity, SceneError> {
    let first = created.len();
    let mut stack = vec![(packed, parent)];
    while let Some((packed, parent)) = stack.pop() {
        let id = remap.get(&packed.id).copied().unwrap_or(packed.id);
        let entity = world.create_entity_with_id(id, parent)?;
        created.push(entity);

        world.set_name(entity, packed.name.clone())?;
        world.set_enabled(entity, packed.enabled)?;
        for (type_id, value) in decoded.next().unwrap_or_default() {
            world.add_boxed_component(entity, type_id, value)?;
        }
        stack.extend(packed.children.iter().rev().map(|c| (c, Some(entity))));
    }
    Ok(created[first])
}
