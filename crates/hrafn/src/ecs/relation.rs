//! Named relationship pairs.
//!
//! A relation is a directional, non-owning link from one entity to another
//! by [`StableId`]: `"follows" → 4c1e…`. The target does not have to exist.
//! An unresolvable target is a pending relation, not an error, and resolves
//! on its own once an entity with that identifier is registered.
//!
//! No inverse pair is maintained. Cycles (`a follows b follows a`) are fine:
//! relations are lookups, not ownership.

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::identity::StableId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub target: StableId,
    /// Opaque data carried with the link.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Relation {
    pub fn new(target: StableId) -> Self {
        Self {
            target,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Outcome of resolving a relation against the live world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationTarget {
    Resolved(Entity),
    /// The target identifier has no live entity (yet).
    Pending(StableId),
}

impl RelationTarget {
    pub fn entity(self) -> Option<Entity> {
        match self {
            Self::Resolved(entity) => Some(entity),
            Self::Pending(_) => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// A relation whose target is not currently live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelation {
    pub source: Entity,
    pub name: String,
    pub target: StableId,
}
