//! # Hrafn — Entity Store, Physics Binding, and Scene Packing
//!
//! The runtime entity model of an interactive engine: an archetype ECS with
//! stable identifiers and tags, a tag-driven layer that keeps physics
//! backend objects in step with entities, and a packer that turns entity
//! subtrees into versioned documents and back.
//!
//! Start with `use hrafn::prelude::*`.

pub mod components;
pub mod ecs;
pub mod error;
pub mod math;
pub mod physics;
pub mod prelude;
pub mod scene;
