//! # Identity — Stable Identifiers Across Representations
//!
//! An [`Entity`] handle is only meaningful inside the [`World`](super::World)
//! that issued it, and only until its slot is recycled. Anything that has to
//! survive beyond that (saved scenes, physics bindings, relationships into
//! other scenes) refers to a [`StableId`] instead.
//!
//! ```text
//! StableId ──(IdRegistry)──► Entity ──(EntityAllocator)──► slot
//!   persistent                 transient                    recycled
//! ```
//!
//! The [`IdRegistry`] is the only place where a "dangling" identifier (one
//! that appears in a loaded document but has no live entity) is observable.
//! Resolving it yields `None`; it never panics.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Entity;
use crate::error::EcsError;

/// A 128-bit globally unique identifier for an entity, a scene, or an
/// external dependency.
///
/// Serialized as a hyphenated UUID string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    /// The all-zero identifier. Packed entities carrying it have had their
    /// identity stripped and get a fresh one on unpack.
    pub const NIL: Self = Self(Uuid::nil());

    /// A random (version 4) identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// A name-based (version 5) identifier. The same inputs always produce
    /// the same identifier.
    pub fn derived(namespace: StableId, name: &[u8]) -> Self {
        Self(Uuid::new_v5(&namespace.0, name))
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_u128(self) -> u128 {
        self.0.as_u128()
    }

    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StableId({})", self.0)
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for StableId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Lookup table from [`StableId`] to the live [`Entity`] that carries it.
///
/// Identifiers handed out by [`allocate`](IdRegistry::allocate) are never
/// handed out again in the lifetime of the registry, even after the entity
/// that carried them is destroyed. Re-registering a released identifier is
/// allowed: that is how an unpacked scene restores the identity it was saved
/// with.
#[derive(Default)]
pub struct IdRegistry {
    live: HashMap<StableId, Entity>,
    /// Identifiers that were live once and have since been released.
    retired: HashSet<StableId>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce an identifier that is neither live nor retired.
    pub fn allocate(&self) -> StableId {
        loop {
            let id = StableId::random();
            if !self.live.contains_key(&id) && !self.retired.contains(&id) {
                return id;
            }
        }
    }

    /// Map `id` to `entity`.
    ///
    /// Fails with [`EcsError::IdentifierInUse`] if another live entity already
    /// carries `id`. Registering the same pair twice is a no-op.
    pub fn register(&mut self, id: StableId, entity: Entity) -> Result<(), EcsError> {
        match self.live.get(&id) {
            Some(&existing) if existing != entity => Err(EcsError::IdentifierInUse(id)),
            Some(_) => Ok(()),
            None => {
                self.retired.remove(&id);
                self.live.insert(id, entity);
                Ok(())
            }
        }
    }

    /// The live entity carrying `id`, or `None` if nothing in the world does.
    pub fn resolve(&self, id: StableId) -> Option<Entity> {
        self.live.get(&id).copied()
    }

    /// Remove the live mapping for `id`. The identifier stays reserved.
    pub fn release(&mut self, id: StableId) -> Option<Entity> {
        let entity = self.live.remove(&id)?;
        self.retired.insert(id);
        Some(entity)
    }

    pub fn contains(&self, id: StableId) -> bool {
        self.live.contains_key(&id)
    }

    /// Number of live mappings.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl fmt::Debug for IdRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdRegistry")
            .field("live", &self.live.len())
            .field("retired", &self.retired.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32, generation: u32) -> Entity {
        Entity { index, generation }
    }

    #[test]
    fn register_and_resolve() {
        let mut reg = IdRegistry::new();
        let id = reg.allocate();
        reg.register(id, entity(3, 0)).unwrap();
        assert_eq!(reg.resolve(id), Some(entity(3, 0)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn dangling_identifier_resolves_to_none() {
        let reg = IdRegistry::new();
        assert_eq!(reg.resolve(StableId::from_u128(42)), None);
    }

    #[test]
    fn release_removes_mapping() {
        let mut reg = IdRegistry::new();
        let id = reg.allocate();
        reg.register(id, entity(0, 0)).unwrap();
        assert_eq!(reg.release(id), Some(entity(0, 0)));
        assert_eq!(reg.resolve(id), None);
        assert_eq!(reg.release(id), None);
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut reg = IdRegistry::new();
        let id = StableId::from_u128(7);
        reg.register(id, entity(0, 0)).unwrap();
        reg.register(id, entity(0, 0)).unwrap();
        assert!(matches!(
            reg.register(id, entity(1, 0)),
            Err(EcsError::IdentifierInUse(clash)) if clash == id
        ));
    }

    #[test]
    fn released_identifier_can_be_restored() {
        let mut reg = IdRegistry::new();
        let id = StableId::from_u128(9);
        reg.register(id, entity(0, 0)).unwrap();
        reg.release(id);
        reg.register(id, entity(5, 1)).unwrap();
        assert_eq!(reg.resolve(id), Some(entity(5, 1)));
    }

    #[test]
    fn derived_ids_are_deterministic() {
        let ns = StableId::from_u128(1);
        assert_eq!(StableId::derived(ns, b"level"), StableId::derived(ns, b"level"));
        assert_ne!(StableId::derived(ns, b"level"), StableId::derived(ns, b"menu"));
    }

    #[test]
    fn serializes_as_uuid_string() {
        let id = StableId::from_u128(0x1234);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000001234\"");
        let back: StableId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
