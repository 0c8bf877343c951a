//! Convenience re-exports — `use hrafn::prelude::*` for the common items.

// Core
pub use crate::ecs::{
    Entity, GlobalTransform, Relation, RelationTarget, Signature, StableId, Tag, TagChange, TagCursor, TagEvent,
    TagKind, World, propagate_transforms,
};
pub use crate::error::{BackendError, EcsError, SceneError};
pub use crate::math::{Mat4, Quat, Transform, Vec3};

// Components
pub use crate::components::{
    CharacterBody, Collider, ColliderShape, ExternalBody, PhysicsMaterial, Position3D, Rotation3D, Scale3D,
    SceneLink, TriggerArea, Velocity3D,
};

// Physics
pub use crate::physics::{
    BackendHandle, InMemoryBackend, PhysicsBackend, PhysicsBinding, PhysicsBodyKind, physics_update,
};
#[cfg(feature = "physics3d")]
pub use crate::physics::RapierBackend;

// Scenes
pub use crate::scene::{ComponentRegistry, IdPolicy, PackedScene, SceneManager, ScenePacker, SceneUnpacker};
