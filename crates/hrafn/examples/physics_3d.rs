//! 3D Physics — a cube pyramid dropped on the ground, headless.
//!
//! Entities are tagged `PxStatic` / `PxDynamic`; the binding creates the
//! Rapier bodies. After two simulated seconds the resting heights are
//! printed, then the pyramid is packed and reloaded into a fresh world with
//! its own simulation.
//!
//! Run with: `cargo run -p hrafn --example physics_3d --features physics3d`

use hrafn::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn spawn_ground_and_pyramid(world: &mut World) -> Result<Entity, EcsError> {
    let ground = world.spawn((
        Transform::IDENTITY,
        Collider::new(ColliderShape::Plane { normal: Vec3::Y }),
    ));
    world.set_name(ground, Some("ground".into()))?;
    world.add_tag(ground, TagKind::PxStatic)?;

    let half = 0.5;
    let rows = 4;
    for row in 0..rows {
        let count = rows - row;
        let offset = (count - 1) as f32 * half;
        for i in 0..count {
            let x = i as f32 * half * 2.0 - offset;
            let y = half + row as f32 * half * 2.0;
            let cube = world.spawn_child(
                ground,
                (
                    Transform::from_xyz(x, y + 0.01, 0.0),
                    Collider::new(ColliderShape::cuboid(half, half, half)).with_material(PhysicsMaterial {
                        friction: 0.8,
                        ..Default::default()
                    }),
                ),
            )?;
            world.set_name(cube, Some(format!("cube_{row}_{i}")))?;
            world.add_tag(cube, TagKind::PxDynamic)?;
        }
    }

    let ball = world.spawn_child(
        ground,
        (
            Transform::from_xyz(-8.0, 1.0, 0.0),
            Velocity3D::new(12.0, 2.0, 0.0),
            Collider::new(ColliderShape::ball(0.4)),
        ),
    )?;
    world.set_name(ball, Some("ball".into()))?;
    world.add_tag(ball, TagKind::PxDynamic)?;

    Ok(ground)
}

fn run(world: &mut World, seconds: f32) {
    let steps = (seconds / DT) as usize;
    for _ in 0..steps {
        physics_update(world, DT);
    }
}

fn report(world: &World) {
    for entity in world.entities() {
        if let (Some(name), Some(t)) = (world.name(entity), world.get::<Transform>(entity)) {
            println!("{name:>10}: {:>6.2} {:>6.2} {:>6.2}", t.translation.x, t.translation.y, t.translation.z);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut world = World::new();
    PhysicsBinding::new(RapierBackend::new().with_gravity(Vec3::new(0.0, -9.81, 0.0))).install(&mut world)?;
    let ground = spawn_ground_and_pyramid(&mut world)?;
    run(&mut world, 2.0);
    println!("── after 2s ──");
    report(&world);

    let registry = ComponentRegistry::with_builtins();
    let scene = ScenePacker::new(&registry).with_name("pyramid").pack(&world, ground)?;

    let mut replay = World::new();
    PhysicsBinding::new(RapierBackend::new()).install(&mut replay)?;
    SceneUnpacker::new(&registry).unpack(&mut replay, &scene)?;
    run(&mut replay, 1.0);
    println!("── reloaded, 1s later ──");
    report(&replay);
    Ok(())
}
