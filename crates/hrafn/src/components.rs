//! Built-in components.
//!
//! Plain data only. Everything here except [`ExternalBody`] is serializable
//! and registered by
//! [`ComponentRegistry::with_builtins`](crate::scene::ComponentRegistry::with_builtins).
//!
//! Positions can be given either as one [`Transform`](crate::math::Transform)
//! or as separate [`Position3D`] / [`Rotation3D`] / [`Scale3D`] components.
//! The physics binding reads `Transform` first and falls back to the split
//! form.

use serde::{Deserialize, Serialize};

use crate::ecs::StableId;
use crate::error::BackendError;
use crate::math::{Quat, Transform, Vec3};
use crate::physics::{BackendHandle, PhysicsBodyKind};

// ── Spatial ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D(pub Vec3);

impl Position3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self(Vec3::new(x, y, z))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation3D(pub Quat);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale3D(pub Vec3);

impl Default for Scale3D {
    fn default() -> Self {
        Self(Vec3::ONE)
    }
}

/// Linear velocity in units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity3D(pub Vec3);

impl Velocity3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self(Vec3::new(x, y, z))
    }
}

/// The transform an entity presents to the physics backend: `Transform` if
/// present, else whatever split components it has, else identity.
pub fn body_transform(
    transform: Option<&Transform>,
    position: Option<&Position3D>,
    rotation: Option<&Rotation3D>,
    scale: Option<&Scale3D>,
) -> Transform {
    if let Some(t) = transform {
        return *t;
    }
    Transform {
        translation: position.map_or(Vec3::ZERO, |p| p.0),
        rotation: rotation.map_or(Quat::IDENTITY, |r| r.0),
        scale: scale.map_or(Vec3::ONE, |s| s.0),
    }
}

// ── Physics descriptors ──────────────────────────────────────────────────

/// Collision geometry. Dimensions are half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ColliderShape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
    /// Y-aligned capsule.
    Capsule { half_height: f32, radius: f32 },
    /// Infinite plane through the body origin.
    Plane { normal: Vec3 },
}

impl ColliderShape {
    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Self::Cuboid {
            half_extents: Vec3::new(hx, hy, hz),
        }
    }

    pub fn ball(radius: f32) -> Self {
        Self::Ball { radius }
    }

    pub fn capsule(half_height: f32, radius: f32) -> Self {
        Self::Capsule {
            half_height,
            radius,
        }
    }

    /// Reject degenerate geometry before it reaches a backend.
    pub fn validate(&self) -> Result<(), BackendError> {
        let ok = match *self {
            Self::Cuboid { half_extents } => half_extents.is_finite() && half_extents.min_element() > 0.0,
            Self::Ball { radius } => radius.is_finite() && radius > 0.0,
            Self::Capsule {
                half_height,
                radius,
            } => half_height.is_finite() && half_height >= 0.0 && radius.is_finite() && radius > 0.0,
            Self::Plane { normal } => normal.is_finite() && normal.length_squared() > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(BackendError::InvalidShape(format!("{self:?}")))
        }
    }
}

impl Default for ColliderShape {
    fn default() -> Self {
        Self::cuboid(0.5, 0.5, 0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
            density: 1.0,
        }
    }
}

/// Shape and surface of a physics body. Entities tagged for physics without
/// one get the default unit cube.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Collider {
    pub shape: ColliderShape,
    #[serde(default)]
    pub material: PhysicsMaterial,
}

impl Collider {
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            material: PhysicsMaterial::default(),
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }
}

/// Character controller descriptor. A `PxKinematic` entity carrying one is
/// bound as a character rather than a plain kinematic body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterBody {
    pub height: f32,
    pub radius: f32,
    /// Steepest walkable slope, radians.
    pub slope_limit: f32,
    pub step_offset: f32,
    pub contact_offset: f32,
    pub up: Vec3,
}

impl CharacterBody {
    /// The capsule enclosing the character.
    pub fn shape(&self) -> ColliderShape {
        ColliderShape::Capsule {
            half_height: (self.height * 0.5 - self.radius).max(0.0),
            radius: self.radius,
        }
    }
}

impl Default for CharacterBody {
    fn default() -> Self {
        Self {
            height: 1.8,
            radius: 0.3,
            slope_limit: std::f32::consts::FRAC_PI_4,
            step_offset: 0.3,
            contact_offset: 0.1,
            up: Vec3::Y,
        }
    }
}

/// Sensor volume. A `PxStatic` entity carrying one is bound as a trigger
/// area.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerArea {
    pub shape: ColliderShape,
}

// ── References ───────────────────────────────────────────────────────────

/// Marks an entity as standing in for another packed scene. Packing records
/// the scene as an external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneLink {
    pub scene: StableId,
}

/// A backend object created outside the binding layer, to be adopted when
/// the entity receives `CreateExternalRef`. Runtime only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalBody {
    pub handle: BackendHandle,
    pub kind: PhysicsBodyKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_validation() {
        assert!(ColliderShape::ball(1.0).validate().is_ok());
        assert!(ColliderShape::ball(0.0).validate().is_err());
        assert!(ColliderShape::cuboid(1.0, -1.0, 1.0).validate().is_err());
        assert!(ColliderShape::capsule(0.0, 0.5).validate().is_ok());
        assert!(ColliderShape::Plane { normal: Vec3::ZERO }.validate().is_err());
        assert!(ColliderShape::ball(f32::NAN).validate().is_err());
    }

    #[test]
    fn character_capsule_fits_height() {
        let body = CharacterBody {
            height: 2.0,
            radius: 0.5,
            ..CharacterBody::default()
        };
        assert_eq!(body.shape(), ColliderShape::capsule(0.5, 0.5));
    }

    #[test]
    fn body_transform_prefers_full_transform() {
        let t = Transform::from_xyz(1.0, 2.0, 3.0);
        let p = Position3D::new(9.0, 9.0, 9.0);
        assert_eq!(body_transform(Some(&t), Some(&p), None, None), t);
        let split = body_transform(None, Some(&p), None, None);
        assert_eq!(split.translation, p.0);
        assert_eq!(split.scale, Vec3::ONE);
    }

    #[test]
    fn shape_serializes_with_type_field() {
        let json = serde_json::to_value(ColliderShape::ball(0.25)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Ball", "radius": 0.25 }));
    }
}
