//! # Physics Binding
//!
//! Tags decide which physics object an entity has; this module keeps the
//! backend in step with those tags.
//!
//! ```text
//!                 PxStatic            PxStatic + TriggerArea
//!            ┌──────────────► BoundStatic        BoundArea ◄───┐
//!            │    PxKinematic                                   │
//!  Unbound ──┼──────────────► BoundKinematic                    │
//!            │    PxKinematic + CharacterBody                   │
//!            ├──────────────► BoundCharacter                    │
//!            │    PxDynamic                                     │
//!            ├──────────────► BoundDynamic                      │
//!            │    CreateExternalRef (adopts ExternalBody)       │
//!            └──────────────► bound to the adopted handle ──────┘
//!
//!  tag removed / rival tag added / entity destroyed → destroy call → Unbound
//! ```
//!
//! The layer runs as world tag and despawn hooks, so the backend object is
//! created before `add_tag` returns and destroyed before `destroy_entity`
//! frees the slot. Bindings are keyed by [`StableId`](crate::ecs::StableId),
//! never by slot index.
//!
//! The backend itself sits behind [`PhysicsBackend`]. [`InMemoryBackend`]
//! needs nothing external; `RapierBackend` (feature `physics3d`) drives a
//! real Rapier simulation.

mod backend;
mod binding;
mod memory;
#[cfg(feature = "physics3d")]
mod rapier;

pub use backend::PhysicsBackend;
pub use binding::{BoundObject, PhysicsBinding, body_kind_for, physics_update};
pub use memory::{BackendCall, InMemoryBackend};
#[cfg(feature = "physics3d")]
pub use rapier::RapierBackend;

use std::fmt;

/// Opaque reference to a backend-owned simulation object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendHandle(pub u64);

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendHandle({})", self.0)
    }
}

/// What kind of object an entity is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicsBodyKind {
    Static,
    Kinematic,
    Dynamic,
    Character,
    Area,
}

impl PhysicsBodyKind {
    /// Kinds whose pose is driven by the entity and pushed to the backend.
    pub fn is_entity_driven(self) -> bool {
        matches!(self, Self::Kinematic | Self::Character)
    }
}
