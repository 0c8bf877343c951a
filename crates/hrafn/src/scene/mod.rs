//! # Scene Packing — Live Subtrees to Documents and Back
//!
//! A [`PackedScene`] is the portable projection of one or more entity
//! subtrees. [`ScenePacker`] produces one from a live world;
//! [`SceneUnpacker`] rebuilds entities from one; [`SceneManager`] keeps
//! track of which documents are loaded.
//!
//! ## Document shape
//!
//! ```text
//! PackedScene { format_version, id, name, metadata }
//! ├── entities: [PackedEntity]          roots, packing order
//! │   ├── id, name, enabled
//! │   ├── components: [{ kind, data }]  sorted by kind
//! │   ├── tags:       [Tag]             sorted by name, transient tags left out
//! │   ├── relations:  [{ name, target, payload }]
//! │   └── children:   [PackedEntity]    sibling order
//! └── external_dependencies: [{ id, kind }]
//! ```
//!
//! That is the in-memory tree. The JSON form lists every entity once in
//! depth-first order and gives `children` as indices into that list.
//!
//! Everything refers to entities by [`StableId`](crate::ecs::StableId).
//! A relation whose target is not packed in the same document is recorded
//! once as an external dependency and left pending in the live world until
//! the scene holding the target is loaded.
//!
//! ## Quick Start
//!
//! ```ignore
//! let registry = ComponentRegistry::with_builtins();
//! let scene = ScenePacker::new(&registry).with_name("level").pack(&world, root)?;
//! write_scene_file(&scene, "level.scene.json")?;
//!
//! let scene = read_scene_file("level.scene.json")?;
//! let root = SceneUnpacker::new(&registry).unpack(&mut other_world, &scene)?.root();
//! ```

mod manager;
mod pack;
mod packed;
mod registry;
mod unpack;

pub use manager::SceneManager;
pub use pack::ScenePacker;
pub use packed::{
    DependencyKind, FORMAT_VERSION, PackedComponent, PackedDependency, PackedEntity, PackedRelation, PackedScene,
    SceneMetadata, Walk, from_json_str, read_scene_file, to_json_string, write_scene_file,
};
pub use registry::ComponentRegistry;
pub use unpack::{IdPolicy, SceneUnpacker, UnpackedScene};
