use std::collections::BTreeMap;
use std::path::Path;

use crate::ecs::{Entity, StableId, World};
use crate::error::SceneError;

use super::pack::ScenePacker;
use super::packed::{
    DependencyKind, PackedDependency, PackedScene, SceneMetadata, read_scene_file, write_scene_file,
};
use super::registry::ComponentRegistry;
use super::unpack::{IdPolicy, SceneUnpacker};

#[derive(Debug, Clone)]
struct LoadedScene {
    name: String,
    metadata: SceneMetadata,
    roots: Vec<Entity>,
    dependencies: Vec<PackedDependency>,
}

/// Tracks which packed scenes are live in a world.
///
/// ```ignore
/// let mut scenes = SceneManager::new(ComponentRegistry::with_builtins());
/// let id = scenes.load_file(&mut world, "levels/forest.scene.json")?;
/// // ... play ...
/// scenes.save_file(&world, id, "saves/forest.scene.json")?;
/// scenes.unload(&mut world, id)?;
/// ```
#[derive(Debug, Default)]
pub struct SceneManager {
    registry: ComponentRegistry,
    loaded: BTreeMap<StableId, LoadedScene>,
}

impl SceneManager {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            loaded: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Unpack `scene` into `world` with its identifiers preserved. Returns
    /// the scene's root entities.
    pub fn load(&mut self, world: &mut World, scene: &PackedScene) -> Result<Vec<Entity>, SceneError> {
        if self.loaded.contains_key(&scene.id) {
            return Err(SceneError::AlreadyLoaded(scene.id));
        }
        let out = SceneUnpacker::new(&self.registry)
            .with_id_policy(IdPolicy::Preserve)
            .unpack(world, scene)?;
        log::info!(
            "loaded scene {} `{}` ({} entities)",
            scene.id,
            scene.name,
            out.entities.len()
        );
        self.loaded.insert(
            scene.id,
            LoadedScene {
                name: scene.name.clone(),
                metadata: scene.metadata.clone(),
                roots: out.roots.clone(),
                dependencies: scene.external_dependencies.clone(),
            },
        );
        Ok(out.roots)
    }

    pub fn load_file(&mut self, world: &mut World, path: impl AsRef<Path>) -> Result<StableId, SceneError> {
        let scene = read_scene_file(path)?;
        self.load(world, &scene)?;
        Ok(scene.id)
    }

    /// Destroy every root the scene still has, with their subtrees.
    pub fn unload(&mut self, world: &mut World, id: StableId) -> Result<(), SceneError> {
        let scene = self.loaded.remove(&id).ok_or(SceneError::NotLoaded(id))?;
        for &root in &scene.roots {
            if world.is_valid(root) {
                world.destroy_entity(root)?;
            }
        }
        log::info!("unloaded scene {id} `{}`", scene.name);
        Ok(())
    }

    /// Pack the scene's live roots again under the same id, name, and
    /// metadata. Roots destroyed since loading are left out.
    pub fn save(&self, world: &World, id: StableId) -> Result<PackedScene, SceneError> {
        let scene = self.loaded.get(&id).ok_or(SceneError::NotLoaded(id))?;
        let roots: Vec<Entity> = scene.roots.iter().copied().filter(|&r| world.is_valid(r)).collect();
        ScenePacker::new(&self.registry)
            .with_scene_id(id)
            .with_name(scene.name.clone())
            .with_metadata(scene.metadata.clone())
            .pack_roots(world, &roots)
    }

    pub fn save_file(&self, world: &World, id: StableId, path: impl AsRef<Path>) -> Result<(), SceneError> {
        write_scene_file(&self.save(world, id)?, path)
    }

    pub fn is_loaded(&self, id: StableId) -> bool {
        self.loaded.contains_key(&id)
    }

    /// Loaded scene ids, sorted.
    pub fn loaded_scenes(&self) -> Vec<StableId> {
        self.loaded.keys().copied().collect()
    }

    pub fn roots(&self, id: StableId) -> Option<&[Entity]> {
        self.loaded.get(&id).map(|s| s.roots.as_slice())
    }

    /// External dependencies of loaded scenes that the world cannot satisfy
    /// yet: entities not live, scenes not loaded. Each listed once.
    pub fn unresolved_dependencies(&self, world: &World) -> Vec<PackedDependency> {
        let mut unresolved: Vec<PackedDependency> = Vec::new();
        for scene in self.loaded.values() {
            for dep in &scene.dependencies {
                let resolved = match dep.kind {
                    DependencyKind::Entity => world.resolve(dep.id).is_some(),
                    DependencyKind::Scene => self.is_loaded(dep.id),
                };
                if !resolved && !unresolved.contains(dep) {
                    unresolved.push(*dep);
                }
            }
        }
        unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Position3D, SceneLink};
    use crate::ecs::{Relation, RelationTarget, TagKind};
    use crate::physics::{InMemoryBackend, PhysicsBackend, PhysicsBinding};

    fn packed_single(world: &mut World, registry: &ComponentRegistry, name: &str) -> (PackedScene, StableId) {
        let e = world.spawn((Position3D::new(1.0, 0.0, 0.0),));
        let id = world.id(e).unwrap();
        let scene = ScenePacker::new(registry).with_name(name).pack(world, e).unwrap();
        world.destroy_entity(e).unwrap();
        (scene, id)
    }

    #[test]
    fn load_and_unload() {
        let mut world = World::new();
        let mut scenes = SceneManager::new(ComponentRegistry::with_builtins());
        let (scene, entity_id) = packed_single(&mut world, scenes.registry(), "one");

        let roots = scenes.load(&mut world, &scene).unwrap();
        assert_eq!(world.id(roots[0]).unwrap(), entity_id);
        assert!(scenes.is_loaded(scene.id));
        assert!(matches!(
            scenes.load(&mut world, &scene),
            Err(SceneError::AlreadyLoaded(_))
        ));

        scenes.unload(&mut world, scene.id).unwrap();
        assert_eq!(world.entity_count(), 0);
        assert!(scenes.loaded_scenes().is_empty());
        assert!(matches!(
            scenes.unload(&mut world, scene.id),
            Err(SceneError::NotLoaded(_))
        ));
    }

    #[test]
    fn unload_releases_physics_objects() {
        let mut world = World::new();
        let backend = InMemoryBackend::new();
        PhysicsBinding::new(backend.clone()).install(&mut world).unwrap();
        let mut scenes = SceneManager::default();

        let e = world.create_entity(None).unwrap();
        world.add_tag(e, TagKind::PxDynamic).unwrap();
        let scene = ScenePacker::new(scenes.registry()).pack(&world, e).unwrap();
        world.destroy_entity(e).unwrap();
        assert_eq!(backend.object_count(), 0);

        scenes.load(&mut world, &scene).unwrap();
        assert_eq!(backend.object_count(), 1);
        scenes.unload(&mut world, scene.id).unwrap();
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn save_repacks_under_the_same_identity() {
        let mut world = World::new();
        let mut scenes = SceneManager::default();
        let (mut scene, _) = packed_single(&mut world, scenes.registry(), "level");
        scene.metadata.author = Some("ada".into());
        let roots = scenes.load(&mut world, &scene).unwrap();

        world.get_mut::<Position3D>(roots[0]).unwrap().0.y = 5.0;
        let saved = scenes.save(&world, scene.id).unwrap();
        assert_eq!(saved.id, scene.id);
        assert_eq!(saved.name, "level");
        assert_eq!(saved.metadata.author.as_deref(), Some("ada"));
        assert_eq!(
            saved.entities[0].component("Position3D"),
            Some(&serde_json::json!([1.0, 5.0, 0.0]))
        );
    }

    #[test]
    fn cross_scene_relation_resolves_once_target_scene_loads() {
        let registry = ComponentRegistry::with_builtins();
        let mut authoring = World::new();
        let x = authoring.create_entity(None).unwrap();
        let x_id = authoring.id(x).unwrap();
        let c = authoring.create_entity(None).unwrap();
        authoring.add_relation(c, "follows", Relation::new(x_id)).unwrap();
        let scene_x = ScenePacker::new(&registry).with_name("x").pack(&authoring, x).unwrap();
        let scene_c = ScenePacker::new(&registry).with_name("c").pack(&authoring, c).unwrap();
        assert_eq!(scene_c.external_dependencies.len(), 1);

        let mut world = World::new();
        let mut scenes = SceneManager::new(registry);
        let c_live = scenes.load(&mut world, &scene_c).unwrap()[0];
        assert_eq!(
            world.resolve_relation(c_live, "follows"),
            Some(RelationTarget::Pending(x_id))
        );
        assert_eq!(scenes.unresolved_dependencies(&world).len(), 1);
        assert_eq!(world.pending_relations().len(), 1);

        let x_live = scenes.load(&mut world, &scene_x).unwrap()[0];
        assert_eq!(
            world.resolve_relation(c_live, "follows"),
            Some(RelationTarget::Resolved(x_live))
        );
        assert!(scenes.unresolved_dependencies(&world).is_empty());
    }

    #[test]
    fn scene_links_are_satisfied_by_loading_the_linked_scene() {
        let mut world = World::new();
        let mut scenes = SceneManager::default();
        let (inner, _) = packed_single(&mut world, scenes.registry(), "inner");

        let portal = world.spawn((SceneLink { scene: inner.id },));
        let outer = ScenePacker::new(scenes.registry()).pack(&world, portal).unwrap();
        world.destroy_entity(portal).unwrap();

        scenes.load(&mut world, &outer).unwrap();
        assert_eq!(scenes.unresolved_dependencies(&world)[0].kind, DependencyKind::Scene);
        scenes.load(&mut world, &inner).unwrap();
        assert!(scenes.unresolved_dependencies(&world).is_empty());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("level.scene.json");
        let mut world = World::new();
        let mut scenes = SceneManager::default();
        let (scene, _) = packed_single(&mut world, scenes.registry(), "level");

        scenes.load(&mut world, &scene).unwrap();
        scenes.save_file(&world, scene.id, &path).unwrap();
        scenes.unload(&mut world, scene.id).unwrap();

        let id = scenes.load_file(&mut world, &path).unwrap();
        assert_eq!(id, scene.id);
        assert_eq!(world.entity_count(), 1);
    }
}
