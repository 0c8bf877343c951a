use crate::components::{CharacterBody, ColliderShape, PhysicsMaterial};
use crate::error::BackendError;
use crate::math::{Transform, Vec3};

use super::BackendHandle;

/// The object-lifecycle surface of a physics engine.
///
/// Calls are synchronous and never re-entered. Whatever threading the
/// engine does internally is its own business.
pub trait PhysicsBackend: Send + Sync {
    fn create_static_body(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError>;

    fn create_dynamic_body(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError>;

    fn create_kinematic_body(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError>;

    /// The collision shape comes from [`CharacterBody::shape`].
    fn create_character_controller(
        &mut self,
        character: &CharacterBody,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError>;

    fn create_trigger_area(
        &mut self,
        shape: &ColliderShape,
        material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError>;

    /// Unknown handles are ignored.
    fn destroy_object(&mut self, handle: BackendHandle);

    fn set_transform(&mut self, handle: BackendHandle, transform: &Transform);

    fn contains(&self, handle: BackendHandle) -> bool;

    fn object_count(&self) -> usize;

    /// Current pose of a simulated object, if the backend tracks one.
    fn transform(&self, _handle: BackendHandle) -> Option<Transform> {
        None
    }

    fn set_linear_velocity(&mut self, _handle: BackendHandle, _velocity: Vec3) {}

    /// Move a character controller from `from` by `displacement` over the
    /// coming step and return the position it will end up at, or `None` for
    /// an unknown handle. The default moves it unobstructed.
    fn move_character(
        &mut self,
        handle: BackendHandle,
        from: &Transform,
        displacement: Vec3,
        _dt: f32,
    ) -> Option<Vec3> {
        if !self.contains(handle) {
            return None;
        }
        let mut target = *from;
        target.translation += displacement;
        self.set_transform(handle, &target);
        Some(target.translation)
    }

    /// Advance the simulation.
    fn step(&mut self, _dt: f32) {}
}
