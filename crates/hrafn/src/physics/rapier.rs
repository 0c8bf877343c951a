//! [`PhysicsBackend`] over a Rapier 3D simulation.
//!
//! Every backend object is one rigid body with one collider attached.
//! Characters are position-based kinematic capsules; trigger areas are fixed
//! bodies with a sensor collider. `step` runs a fixed timestep off an
//! accumulator, so frame time and simulation time are decoupled.

use std::collections::HashMap;

use rapier3d::prelude::*;

use crate::components::{CharacterBody, ColliderShape, PhysicsMaterial};
use crate::error::BackendError;
use crate::math::{Quat, Transform, Vec3};

use super::backend::PhysicsBackend;
use super::{BackendHandle, PhysicsBodyKind};

/// Half-extent used to stand in for an infinite plane.
const PLANE_EXTENT: f32 = 1000.0;
const PLANE_THICKNESS: f32 = 0.01;

// ── Conversion helpers ──────────────────────────────────────────────────

fn body_type_for(kind: PhysicsBodyKind) -> RigidBodyType {
    match kind {
        PhysicsBodyKind::Static | PhysicsBodyKind::Area => RigidBodyType::Fixed,
        PhysicsBodyKind::Kinematic | PhysicsBodyKind::Character => RigidBodyType::KinematicPositionBased,
        PhysicsBodyKind::Dynamic => RigidBodyType::Dynamic,
    }
}

fn collider_builder(shape: &ColliderShape) -> ColliderBuilder {
    match *shape {
        ColliderShape::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        ColliderShape::Ball { radius } => ColliderBuilder::ball(radius),
        ColliderShape::Capsule {
            half_height,
            radius,
        } => ColliderBuilder::capsule_y(half_height, radius),
        ColliderShape::Plane { normal } => {
            let tilt = Quat::from_rotation_arc(Vec3::Y, normal.normalize());
            ColliderBuilder::cuboid(PLANE_EXTENT, PLANE_THICKNESS, PLANE_EXTENT)
                .translation(normal.normalize() * -PLANE_THICKNESS)
                .rotation(quat_to_scaled_axis(tilt))
        }
    }
}

/// Convert a glam Quat to a scaled-axis-angle Vec3 (for the builders' `rotation`).
fn quat_to_scaled_axis(q: Quat) -> Vec3 {
    let (axis, angle) = q.to_axis_angle();
    axis * angle
}

// ── Backend ─────────────────────────────────────────────────────────────

pub struct RapierBackend {
    gravity: Vec3,
    pipeline: PhysicsPipeline,
    params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    objects: HashMap<BackendHandle, (RigidBodyHandle, PhysicsBodyKind)>,
    next_handle: u64,
    accumulator: f32,
}

impl std::fmt::Debug for RapierBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapierBackend")
            .field("gravity", &self.gravity)
            .field("objects", &self.objects.len())
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .finish()
    }
}

impl RapierBackend {
    /// Default gravity (0, -9.81, 0).
    pub fn new() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            pipeline: PhysicsPipeline::new(),
            params: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            objects: HashMap::new(),
            next_handle: 0,
            accumulator: 0.0,
        }
    }

    pub fn with_gravity(mut self, g: Vec3) -> Self {
        self.gravity = g;
        self
    }

    fn insert(
        &mut self,
        kind: PhysicsBodyKind,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        shape.validate()?;
        let body = RigidBodyBuilder::new(body_type_for(kind))
            .translation(transform.translation)
            .rotation(quat_to_scaled_axis(transform.rotation))
            .build();
        let body_handle = self.bodies.insert(body);

        let collider = collider_builder(shape)
            .restitution(material.restitution)
            .friction(material.friction)
            .density(material.density)
            .sensor(kind == PhysicsBodyKind::Area)
            .build();
        self.colliders
            .insert_with_parent(collider, body_handle, &mut self.bodies);

        self.next_handle += 1;
        let handle = BackendHandle(self.next_handle);
        self.objects.insert(handle, (body_handle, kind));
        Ok(handle)
    }
}

impl Default for RapierBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsBackend for RapierBackend {
    fn create_static_body(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.insert(PhysicsBodyKind::Static, shape, material, transform)
    }

    fn create_dynamic_body(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        if matches!(shape, ColliderShape::Plane { .. }) {
            return Err(BackendError::Rejected("planes cannot be dynamic".into()));
        }
        self.insert(PhysicsBodyKind::Dynamic, shape, material, transform)
    }

    fn create_kinematic_body(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.insert(PhysicsBodyKind::Kinematic, shape, material, transform)
    }

    fn create_character_controller(
        &mut self,
        character: &CharacterBody,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.insert(PhysicsBodyKind::Character, &character.shape(), material, transform)
    }

    fn create_trigger_area(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.insert(PhysicsBodyKind::Area, shape, material, transform)
    }

    fn destroy_object(&mut self, handle: BackendHandle) {
        let Some((body, _)) = self.objects.remove(&handle) else {
            return;
        };
        self.bodies.remove(
            body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    // Characters use the default `move_character`, which lands on
    // `set_next_kinematic_position` below.
    // TODO: resolve character moves with rapier's KinematicCharacterController
    // so they slide along static geometry instead of passing through it.
    fn set_transform(&mut self, handle: BackendHandle, transform: &Transform) {
        let Some(&(body_handle, kind)) = self.objects.get(&handle) else {
            return;
        };
        let Some(body) = self.bodies.get_mut(body_handle) else {
            return;
        };
        let pose = Pose::from_parts(transform.translation, transform.rotation);
        if kind.is_entity_driven() {
            body.set_next_kinematic_position(pose);
        } else {
            body.set_position(pose, true);
        }
    }

    fn contains(&self, handle: BackendHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn transform(&self, handle: BackendHandle) -> Option<Transform> {
        let (body_handle, _) = self.objects.get(&handle)?;
        let body = self.bodies.get(*body_handle)?;
        Some(Transform {
            translation: body.translation(),
            rotation: *body.rotation(),
            scale: Vec3::ONE,
        })
    }

    fn set_linear_velocity(&mut self, handle: BackendHandle, velocity: Vec3) {
        if let Some(body) = self
            .objects
            .get(&handle)
            .and_then(|(h, _)| self.bodies.get_mut(*h))
        {
            body.set_linvel(velocity, true);
        }
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        // Capped so a long frame cannot queue an unbounded number of steps.
        self.accumulator += dt.min(0.25);
        let fixed_dt = self.params.dt;
        while self.accumulator >= fixed_dt {
            self.pipeline.step(
                self.gravity,
                &self.params,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                &(),
                &(),
            );
            self.accumulator -= fixed_dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_body_falls() {
        let mut backend = RapierBackend::new();
        let handle = backend
            .create_dynamic_body(
                &ColliderShape::ball(0.5),
                &PhysicsMaterial::default(),
                &Transform::from_xyz(0.0, 10.0, 0.0),
            )
            .unwrap();
        for _ in 0..30 {
            backend.step(1.0 / 60.0);
        }
        assert!(backend.transform(handle).unwrap().translation.y < 10.0);
    }

    #[test]
    fn destroy_removes_body_and_collider() {
        let mut backend = RapierBackend::new();
        let handle = backend
            .create_trigger_area(&ColliderShape::default(), &PhysicsMaterial::default(), &Transform::IDENTITY)
            .unwrap();
        assert_eq!(backend.colliders.len(), 1);
        backend.destroy_object(handle);
        assert!(!backend.contains(handle));
        assert_eq!(backend.bodies.len(), 0);
        assert_eq!(backend.colliders.len(), 0);
    }

    #[test]
    fn character_reaches_its_move_target_on_step() {
        let mut backend = RapierBackend::new();
        let handle = backend
            .create_character_controller(&CharacterBody::default(), &PhysicsMaterial::default(), &Transform::IDENTITY)
            .unwrap();
        let target = backend.move_character(handle, &Transform::IDENTITY, Vec3::new(1.0, 0.0, 0.0), 1.0 / 30.0);
        assert_eq!(target, Some(Vec3::new(1.0, 0.0, 0.0)));
        backend.step(1.0 / 30.0);
        let position = backend.transform(handle).unwrap().translation;
        assert!((position - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn degenerate_shape_is_rejected() {
        let mut backend = RapierBackend::new();
        assert!(
            backend
                .create_static_body(&ColliderShape::ball(0.0), &PhysicsMaterial::default(), &Transform::IDENTITY)
                .is_err()
        );
        assert_eq!(backend.object_count(), 0);
    }
}
