//! A physics backend that keeps objects in a map and records every call.
//!
//! Used by headless tools and tests. Dynamic objects drift by their linear
//! velocity on `step`; nothing collides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::components::{CharacterBody, ColliderShape, PhysicsMaterial};
use crate::error::BackendError;
use crate::math::{Transform, Vec3};

use super::backend::PhysicsBackend;
use super::{BackendHandle, PhysicsBodyKind};

/// One request made of the backend, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create {
        handle: BackendHandle,
        kind: PhysicsBodyKind,
        shape: ColliderShape,
        transform: Transform,
    },
    Destroy(BackendHandle),
    SetTransform(BackendHandle, Transform),
    SetVelocity(BackendHandle, Vec3),
    MoveCharacter(BackendHandle, Vec3),
    Step(f32),
}

#[derive(Debug, Clone)]
struct MemoryObject {
    kind: PhysicsBodyKind,
    transform: Transform,
    velocity: Vec3,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    objects: HashMap<BackendHandle, MemoryObject>,
    calls: Vec<BackendCall>,
}

/// Cloning shares the same state, so a test can keep one clone for
/// inspection after handing the other to the binding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create(
        &mut self,
        kind: PhysicsBodyKind,
        shape: &ColliderShape,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        shape.validate()?;
        let mut state = self.state();
        state.next_handle += 1;
        let handle = BackendHandle(state.next_handle);
        state.objects.insert(
            handle,
            MemoryObject {
                kind,
                transform: *transform,
                velocity: Vec3::ZERO,
            },
        );
        state.calls.push(BackendCall::Create {
            handle,
            kind,
            shape: *shape,
            transform: *transform,
        });
        Ok(handle)
    }

    /// Create an object the way an outside system would: not logged as a
    /// binding call. Used to hand objects over through `ExternalBody`.
    pub fn insert_external(&self, kind: PhysicsBodyKind, transform: Transform) -> BackendHandle {
        let mut state = self.state();
        state.next_handle += 1;
        let handle = BackendHandle(state.next_handle);
        state.objects.insert(
            handle,
            MemoryObject {
                kind,
                transform,
                velocity: Vec3::ZERO,
            },
        );
        handle
    }

    /// Every call recorded since the last [`take_calls`](Self::take_calls)
    /// or [`clear_calls`](Self::clear_calls), oldest first.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Drain the call record. Long-running headless users call this once a
    /// frame to keep the record from growing.
    pub fn take_calls(&self) -> Vec<BackendCall> {
        std::mem::take(&mut self.state().calls)
    }

    pub fn creates(&self) -> usize {
        self.count_calls(|c| matches!(c, BackendCall::Create { .. }))
    }

    pub fn destroys(&self) -> usize {
        self.count_calls(|c| matches!(c, BackendCall::Destroy(_)))
    }

    fn count_calls(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn kind_of(&self, handle: BackendHandle) -> Option<PhysicsBodyKind> {
        self.state().objects.get(&handle).map(|o| o.kind)
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

impl PhysicsBackend for InMemoryBackend {
    fn create_static_body(
        &mut self,
        shape: &ColliderShape,
        _material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.create(PhysicsBodyKind::Static, shape, transform)
    }

    fn create_dynamic_body(
        &mut self,
        shape: &ColliderShape,
        _material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.create(PhysicsBodyKind::Dynamic, shape, transform)
    }

    fn create_kinematic_body(
        &mut self,
        shape: &ColliderShape,
        _material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.create(PhysicsBodyKind::Kinematic, shape, transform)
    }

    fn create_character_controller(
        &mut self,
        character: &CharacterBody,
        _material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        if character.height <= 0.0 {
            return Err(BackendError::InvalidShape(format!(
                "character height {} must be positive",
                character.height
            )));
        }
        self.create(PhysicsBodyKind::Character, &character.shape(), transform)
    }

    fn create_trigger_area(
        &mut self,
        shape: &ColliderShape,
        _material: &PhysicsMaterial,
        transform: &Transform,
    ) -> Result<BackendHandle, BackendError> {
        self.create(PhysicsBodyKind::Area, shape, transform)
    }

    fn destroy_object(&mut self, handle: BackendHandle) {
        let mut state = self.state();
        state.objects.remove(&handle);
        state.calls.push(BackendCall::Destroy(handle));
    }

    fn set_transform(&mut self, handle: BackendHandle, transform: &Transform) {
        let mut state = self.state();
        if let Some(object) = state.objects.get_mut(&handle) {
            object.transform = *transform;
        }
        state.calls.push(BackendCall::SetTransform(handle, *transform));
    }

    fn contains(&self, handle: BackendHandle) -> bool {
        self.state().objects.contains_key(&handle)
    }

    fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    fn transform(&self, handle: BackendHandle) -> Option<Transform> {
        self.state().objects.get(&handle).map(|o| o.transform)
    }

    fn set_linear_velocity(&mut self, handle: BackendHandle, velocity: Vec3) {
        let mut state = self.state();
        if let Some(object) = state.objects.get_mut(&handle) {
            object.velocity = velocity;
        }
        state.calls.push(BackendCall::SetVelocity(handle, velocity));
    }

    fn move_character(
        &mut self,
        handle: BackendHandle,
        from: &Transform,
        displacement: Vec3,
        _dt: f32,
    ) -> Option<Vec3> {
        let mut state = self.state();
        let object = state.objects.get_mut(&handle)?;
        object.transform = *from;
        object.transform.translation += displacement;
        let position = object.transform.translation;
        state.calls.push(BackendCall::MoveCharacter(handle, displacement));
        Some(position)
    }

    fn step(&mut self, dt: f32) {
        let mut state = self.state();
        for object in state.objects.values_mut() {
            if object.kind == PhysicsBodyKind::Dynamic {
                object.transform.translation += object.velocity * dt;
            }
        }
        state.calls.push(BackendCall::Step(dt));
    }
}
