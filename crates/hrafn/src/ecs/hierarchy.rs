//! # Transform Propagation
//!
//! Parent/child links live in the entity record (see
//! [`World::set_parent`]). This module turns local [`Transform`]s into
//! world-space [`GlobalTransform`]s by walking each root's subtree
//! breadth-first, so every parent is computed before its children.
//!
//! ```text
//! root   (Transform at x=100)          → global x=100
//! └─ arm (no Transform, passes through) → —
//!    └─ hand (Transform at x=10)        → global x=110
//! ```

use std::collections::VecDeque;

use crate::ecs::{Entity, World};
use crate::error::EcsError;
use crate::math::{Mat4, Transform};

/// World-space transform computed by [`propagate_transforms`]. Runtime only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalTransform {
    pub matrix: Mat4,
}

impl GlobalTransform {
    pub fn translation(&self) -> crate::math::Vec3 {
        self.matrix.w_axis.truncate()
    }
}

/// Write a [`GlobalTransform`] onto every entity that has a [`Transform`].
/// Entities without one pass their parent's matrix through unchanged.
pub fn propagate_transforms(world: &mut World) -> Result<(), EcsError> {
    let mut queue: VecDeque<(Entity, Mat4)> = world
        .roots()
        .into_iter()
        .map(|root| (root, Mat4::IDENTITY))
        .collect();

    while let Some((entity, parent_matrix)) = queue.pop_front() {
        let matrix = match world.get::<Transform>(entity).map(Transform::matrix) {
            Some(local) => {
                let matrix = parent_matrix * local;
                match world.get_mut::<GlobalTransform>(entity) {
                    Some(global) => global.matrix = matrix,
                    None => {
                        world.add_component(entity, GlobalTransform { matrix })?;
                    }
                }
                matrix
            }
            None => parent_matrix,
        };
        queue.extend(world.children(entity).iter().map(|&child| (child, matrix)));
    }
    Ok(())
}
