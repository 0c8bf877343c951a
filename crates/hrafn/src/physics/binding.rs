use std::collections::HashMap;

use crate::components::{
    CharacterBody, Collider, ExternalBody, Position3D, Rotation3D, Scale3D, TriggerArea, Velocity3D, body_transform,
};
use crate::ecs::{Entity, StableId, TagChange, TagEvent, TagKind, World};
use crate::error::{BackendError, EcsError};
use crate::math::{Transform, Vec3};

use super::backend::PhysicsBackend;
use super::{BackendHandle, PhysicsBodyKind};

/// One live backend object and the entity it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundObject {
    pub kind: PhysicsBodyKind,
    pub handle: BackendHandle,
    pub entity: Entity,
    /// Came in through `CreateExternalRef` rather than a create call. The
    /// binding never destroys adopted objects; whoever created them does.
    pub adopted: bool,
}

/// World resource holding the backend and the identifier → object table.
///
/// ```ignore
/// PhysicsBinding::new(InMemoryBackend::new()).install(&mut world)?;
/// world.add_tag(crate_entity, TagKind::PxDynamic)?; // backend object exists now
/// ```
pub struct PhysicsBinding {
    backend: Box<dyn PhysicsBackend>,
    bound: HashMap<StableId, BoundObject>,
}

/// Marks that the binding hooks are registered on a world.
struct BindingHooks;

impl PhysicsBinding {
    pub fn new(backend: impl PhysicsBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            bound: HashMap::new(),
        }
    }

    /// Insert the binding into `world` and register its hooks.
    ///
    /// Entities that already carry a physics tag are bound now. Any that the
    /// backend refuses lose the tag and stay unbound; the first such failure
    /// is returned after the binding is in place. A binding that was already
    /// installed is replaced and its objects destroyed.
    pub fn install(mut self, world: &mut World) -> Result<(), EcsError> {
        if !world.has_resource::<BindingHooks>() {
            world.insert_resource(BindingHooks);
            world.add_tag_hook(on_tag_event);
            world.add_despawn_hook(on_despawn);
        }
        if let Some(mut previous) = world.resource_remove::<PhysicsBinding>() {
            previous.release_all();
        }

        let mut first_failure = None;
        for tag in [TagKind::PxStatic, TagKind::PxKinematic, TagKind::PxDynamic] {
            for entity in world.tagged(&tag) {
                let (Ok(id), Some(kind)) = (world.id(entity), body_kind_for(world, entity, &tag)) else {
                    continue;
                };
                if let Err(err) = self.bind(world, entity, id, kind) {
                    log::warn!("could not bind {entity} on install: {err}");
                    if let Err(undo) = world.remove_tag(entity, &tag) {
                        log::warn!("could not drop {tag} from {entity}: {undo}");
                    }
                    first_failure.get_or_insert(err);
                }
            }
        }

        log::debug!("physics binding installed with {} objects", self.bound.len());
        world.insert_resource(self);
        first_failure.map_or(Ok(()), Err)
    }

    pub fn get(&self, id: StableId) -> Option<&BoundObject> {
        self.bound.get(&id)
    }

    /// `None` means unbound.
    pub fn bound_kind(&self, id: StableId) -> Option<PhysicsBodyKind> {
        self.bound.get(&id).map(|b| b.kind)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StableId, &BoundObject)> {
        self.bound.iter()
    }

    pub fn backend(&self) -> &dyn PhysicsBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn PhysicsBackend {
        self.backend.as_mut()
    }

    /// Create the backend object for `entity`, replacing any it already had.
    fn bind(&mut self, world: &World, entity: Entity, id: StableId, kind: PhysicsBodyKind) -> Result<(), EcsError> {
        self.unbind(id);

        let transform = entity_transform(world, entity);
        let collider = world.get::<Collider>(entity).copied().unwrap_or_default();
        let (shape, material) = (&collider.shape, &collider.material);
        let created = match kind {
            PhysicsBodyKind::Static => self.backend.create_static_body(shape, material, &transform),
            PhysicsBodyKind::Kinematic => self.backend.create_kinematic_body(shape, material, &transform),
            PhysicsBodyKind::Dynamic => self.backend.create_dynamic_body(shape, material, &transform),
            PhysicsBodyKind::Character => {
                let character = world.get::<CharacterBody>(entity).copied().unwrap_or_default();
                self.backend
                    .create_character_controller(&character, material, &transform)
            }
            PhysicsBodyKind::Area => {
                let area_shape = world.get::<TriggerArea>(entity).map_or(*shape, |a| a.shape);
                self.backend.create_trigger_area(&area_shape, material, &transform)
            }
        };
        let handle = created.map_err(|source| EcsError::BackendCreateFailure { id, source })?;

        if kind == PhysicsBodyKind::Dynamic {
            if let Some(velocity) = world.get::<Velocity3D>(entity) {
                self.backend.set_linear_velocity(handle, velocity.0);
            }
        }
        log::debug!("bound {entity} ({id}) as {kind:?} -> {handle:?}");
        self.bound.insert(
            id,
            BoundObject {
                kind,
                handle,
                entity,
                adopted: false,
            },
        );
        Ok(())
    }

    /// Reference the object named by the entity's [`ExternalBody`]. The
    /// object stays owned by whoever created it: unbinding an adopted object
    /// forgets the handle without destroying it.
    fn adopt(&mut self, world: &World, entity: Entity, id: StableId) -> Result<(), EcsError> {
        let external = world.get::<ExternalBody>(entity).copied().ok_or_else(|| {
            EcsError::BackendCreateFailure {
                id,
                source: BackendError::Rejected(format!("{entity} has no ExternalBody to adopt")),
            }
        })?;
        if !self.backend.contains(external.handle) {
            return Err(EcsError::BackendCreateFailure {
                id,
                source: BackendError::UnknownHandle(external.handle),
            });
        }
        self.unbind(id);
        log::debug!("{entity} ({id}) adopted {:?} as {:?}", external.handle, external.kind);
        self.bound.insert(
            id,
            BoundObject {
                kind: external.kind,
                handle: external.handle,
                entity,
                adopted: true,
            },
        );
        Ok(())
    }

    /// Drop the entity's backend object, if it has one. Objects the binding
    /// created are destroyed; adopted ones are only forgotten.
    fn unbind(&mut self, id: StableId) -> Option<BoundObject> {
        let object = self.bound.remove(&id)?;
        if object.adopted {
            log::debug!("unbound {} ({id}), released {:?}", object.entity, object.handle);
        } else {
            self.backend.destroy_object(object.handle);
            log::debug!("unbound {} ({id}), destroyed {:?}", object.entity, object.handle);
        }
        Some(object)
    }

    fn release_all(&mut self) {
        for (_, object) in self.bound.drain() {
            if !object.adopted {
                self.backend.destroy_object(object.handle);
            }
        }
    }
}

impl std::fmt::Debug for PhysicsBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsBinding")
            .field("bound", &self.bound.len())
            .field("backend_objects", &self.backend.object_count())
            .finish()
    }
}

/// The object kind a physics tag asks for on this entity, taking descriptor
/// components into account. `None` for non-physics tags.
pub fn body_kind_for(world: &World, entity: Entity, tag: &TagKind) -> Option<PhysicsBodyKind> {
    Some(match tag {
        TagKind::PxStatic if world.has_component::<TriggerArea>(entity) => PhysicsBodyKind::Area,
        TagKind::PxStatic => PhysicsBodyKind::Static,
        TagKind::PxKinematic if world.has_component::<CharacterBody>(entity) => PhysicsBodyKind::Character,
        TagKind::PxKinematic => PhysicsBodyKind::Kinematic,
        TagKind::PxDynamic => PhysicsBodyKind::Dynamic,
        _ => return None,
    })
}

fn entity_transform(world: &World, entity: Entity) -> Transform {
    body_transform(
        world.get::<Transform>(entity),
        world.get::<Position3D>(entity),
        world.get::<Rotation3D>(entity),
        world.get::<Scale3D>(entity),
    )
}

/// Run `f` with the binding taken out of the world. No-op if no binding is
/// installed.
fn with_binding(
    world: &mut World,
    f: impl FnOnce(&mut PhysicsBinding, &mut World) -> Result<(), EcsError>,
) -> Result<(), EcsError> {
    let Some(mut binding) = world.resource_remove::<PhysicsBinding>() else {
        return Ok(());
    };
    let result = f(&mut binding, world);
    world.insert_resource(binding);
    result
}

fn on_tag_event(world: &mut World, event: &TagEvent) -> Result<(), EcsError> {
    let entity = event.entity;
    match (event.change, event.kind()) {
        (TagChange::Added, tag) if tag.is_physics() => {
            let Some(kind) = body_kind_for(world, entity, tag) else {
                return Ok(());
            };
            with_binding(world, |binding, world| binding.bind(world, entity, event.id, kind))
        }
        (TagChange::Added, TagKind::CreateExternalRef) => {
            world.remove_tag(entity, &TagKind::CreateExternalRef)?;
            world.add_tag(entity, TagKind::ActiveExternalRef)
        }
        (TagChange::Added, TagKind::ActiveExternalRef) => {
            with_binding(world, |binding, world| binding.adopt(world, entity, event.id))
        }
        (TagChange::Added, TagKind::DeleteExternalRef) => {
            world.remove_tag(entity, &TagKind::ActiveExternalRef)?;
            world.remove_tag(entity, &TagKind::DeleteExternalRef)?;
            Ok(())
        }
        (TagChange::Removed, tag) if tag.is_physics() || *tag == TagKind::ActiveExternalRef => {
            with_binding(world, |binding, _| {
                binding.unbind(event.id);
                Ok(())
            })
        }
        _ => Ok(()),
    }
}

fn on_despawn(world: &mut World, _entity: Entity, id: StableId) {
    if let Some(binding) = world.get_resource_mut::<PhysicsBinding>() {
        binding.unbind(id);
    }
}

/// One physics frame.
///
/// Kinematic objects are placed at their entity's pose. Characters with a
/// [`Velocity3D`] are moved by `velocity * dt` from that pose; the rest are
/// placed like kinematic objects. Then the backend steps, dynamic poses are
/// pulled into their entities, and moved characters get their resolved
/// position and the velocity they actually achieved. Disabled entities are
/// not pushed.
pub fn physics_update(world: &mut World, dt: f32) {
    let Some(mut binding) = world.resource_remove::<PhysicsBinding>() else {
        return;
    };

    let mut moved = Vec::new();
    for object in binding.bound.values() {
        if !object.kind.is_entity_driven() || !world.is_enabled(object.entity) {
            continue;
        }
        let transform = entity_transform(world, object.entity);
        match world.get::<Velocity3D>(object.entity) {
            Some(velocity) if object.kind == PhysicsBodyKind::Character => {
                if let Some(position) = binding
                    .backend
                    .move_character(object.handle, &transform, velocity.0 * dt, dt)
                {
                    moved.push((object.entity, transform.translation, position));
                }
            }
            _ => binding.backend.set_transform(object.handle, &transform),
        }
    }

    binding.backend.step(dt);

    for object in binding.bound.values() {
        if object.kind != PhysicsBodyKind::Dynamic {
            continue;
        }
        if let Some(simulated) = binding.backend.transform(object.handle) {
            write_back(world, object.entity, &simulated);
        }
    }
    for (entity, from, to) in moved {
        write_character(world, entity, from, to, dt);
    }

    world.insert_resource(binding);
}

fn write_character(world: &mut World, entity: Entity, from: Vec3, to: Vec3, dt: f32) {
    if let Some(transform) = world.get_mut::<Transform>(entity) {
        transform.translation = to;
    } else if let Some(position) = world.get_mut::<Position3D>(entity) {
        position.0 = to;
    }
    if dt > 0.0 {
        if let Some(velocity) = world.get_mut::<Velocity3D>(entity) {
            velocity.0 = (to - from) / dt;
        }
    }
}

fn write_back(world: &mut World, entity: Entity, simulated: &Transform) {
    if let Some(transform) = world.get_mut::<Transform>(entity) {
        transform.translation = simulated.translation;
        transform.rotation = simulated.rotation;
        return;
    }
    if let Some(position) = world.get_mut::<Position3D>(entity) {
        position.0 = simulated.translation;
    }
    if let Some(rotation) = world.get_mut::<Rotation3D>(entity) {
        rotation.0 = simulated.rotation;
    }
}
