//! Scene round-trip — pack a small world to JSON, reload it elsewhere.
//!
//! Builds a platform with a crate on it and a camera that follows the
//! crate, binds them to the in-memory physics backend, writes the scene to
//! a temp file, and loads it into a second world. Physics objects come
//! back because the tags do.
//!
//! Run with: `RUST_LOG=debug cargo run -p hrafn --example scene_round_trip`

use hrafn::prelude::*;
use hrafn::scene::{read_scene_file, write_scene_file};

fn build(world: &mut World) -> Result<Entity, EcsError> {
    let level = world.spawn((Transform::IDENTITY,));
    world.set_name(level, Some("level".into()))?;

    let floor = world.spawn_child(
        level,
        (
            Transform::from_xyz(0.0, -0.5, 0.0),
            Collider::new(ColliderShape::cuboid(10.0, 0.5, 10.0)),
        ),
    )?;
    world.set_name(floor, Some("floor".into()))?;
    world.add_tag(floor, TagKind::PxStatic)?;

    let crate_box = world.spawn_child(
        level,
        (
            Transform::from_xyz(0.0, 3.0, 0.0),
            Velocity3D::new(0.0, -1.0, 0.0),
            Collider::new(ColliderShape::cuboid(0.5, 0.5, 0.5)),
        ),
    )?;
    world.set_name(crate_box, Some("crate".into()))?;
    world.add_tag(crate_box, TagKind::PxDynamic)?;

    let camera = world.spawn_child(level, (Transform::from_xyz(0.0, 4.0, 8.0),))?;
    world.add_tag(camera, TagKind::ActiveCamera)?;
    world.add_relation(camera, "follows", Relation::new(world.id(crate_box)?))?;

    Ok(level)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let registry = ComponentRegistry::with_builtins();

    let mut world = World::new();
    let backend = InMemoryBackend::new();
    PhysicsBinding::new(backend.clone()).install(&mut world)?;
    let level = build(&mut world)?;
    for _ in 0..10 {
        physics_update(&mut world, 0.1);
    }

    let scene = ScenePacker::new(&registry).with_name("demo").pack(&world, level)?;
    let dir = std::env::temp_dir();
    let path = dir.join("hrafn_demo.scene.json");
    write_scene_file(&scene, &path)?;
    println!("wrote {} entities to {}", scene.entity_count(), path.display());

    let mut restored = World::new();
    let restored_backend = InMemoryBackend::new();
    PhysicsBinding::new(restored_backend.clone()).install(&mut restored)?;
    let mut scenes = SceneManager::new(registry);
    let id = scenes.load_file(&mut restored, &path)?;

    for &entity in &restored.entities() {
        let name = restored.name(entity).unwrap_or("-");
        let tags: Vec<String> = restored.tags(entity).map(|t| t.kind.to_string()).collect();
        let y = restored.get::<Transform>(entity).map(|t| t.translation.y);
        println!("{} {name:<6} y={y:?} tags={tags:?}", restored.id(entity)?);
    }
    println!(
        "physics objects: before={} after={}",
        backend.object_count(),
        restored_backend.object_count()
    );

    scenes.unload(&mut restored, id)?;
    println!(
        "after unload: {} entities, {} physics objects",
        restored.entity_count(),
        restored_backend.object_count()
    );
    Ok(())
}
