//! # Entity Store
//!
//! A small archetype ECS with stable identifiers, tags, and relations.
//!
//! | Piece            | Keyed by            | Lives in           |
//! |------------------|---------------------|--------------------|
//! | components       | `TypeId`            | archetype columns  |
//! | tags             | [`TagKind`]         | entity record      |
//! | relations        | relation name       | entity record      |
//! | hierarchy        | parent / children   | entity record      |
//! | cross-references | [`StableId`]        | [`IdRegistry`]     |
//!
//! [`Entity`] handles are transient. Anything stored outside the world
//! (physics bindings, packed scenes, relations) refers to entities by
//! [`StableId`].

pub(crate) mod archetype;
pub mod component;
pub mod entity;
pub mod hierarchy;
pub mod identity;
pub mod query;
pub mod relation;
pub mod tag;
pub mod world;

pub use component::Component;
pub use entity::Entity;
pub use hierarchy::{GlobalTransform, propagate_transforms};
pub use identity::{IdRegistry, StableId};
pub use query::{Query, QueryIter, QueryParam, Signature};
pub use relation::{PendingRelation, Relation, RelationTarget};
pub use tag::{DEFAULT_TAG_LOG_CAPACITY, DespawnHook, Tag, TagChange, TagCursor, TagEvent, TagHook, TagKind};
pub use world::{SpawnBundle, World};
