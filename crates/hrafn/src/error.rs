//! Error types.
//!
//! Every failure in this crate is recoverable at the call boundary. Nothing
//! here aborts the process, and nothing retries on its own.

use thiserror::Error;

use crate::ecs::{Entity, StableId};
use crate::physics::BackendHandle;

/// Failures of entity store operations.
#[derive(Debug, Error)]
pub enum EcsError {
    /// The handle is stale (its slot was recycled) or was never issued.
    #[error("entity {0} is not alive")]
    InvalidHandle(Entity),

    /// Another live entity already carries this identifier.
    #[error("identifier {0} is already registered to a live entity")]
    IdentifierInUse(StableId),

    /// Reparenting would make an entity its own ancestor.
    #[error("cannot parent {child} under {parent}: {parent} is a descendant of {child}")]
    HierarchyCycle { child: Entity, parent: Entity },

    /// The physics backend refused to create an object for the entity. The
    /// entity is left unbound and the triggering tag is not kept.
    #[error("physics backend refused to create an object for {id}")]
    BackendCreateFailure {
        id: StableId,
        #[source]
        source: BackendError,
    },
}

/// Failures reported by a physics backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("invalid collision shape: {0}")]
    InvalidShape(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("unknown backend handle {0:?}")]
    UnknownHandle(BackendHandle),
}

/// Failures of packing, unpacking, and scene management.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The document is structurally invalid.
    #[error("malformed scene document: {0}")]
    MalformedDocument(String),

    /// A packed component names a kind the registry does not know.
    #[error("unknown component kind `{0}`")]
    UnknownComponent(String),

    /// The same identifier appears on two packed entities.
    #[error("identifier {0} appears more than once in the document")]
    DuplicateIdentifier(StableId),

    #[error("unsupported scene format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("scene {0} is already loaded")]
    AlreadyLoaded(StableId),

    #[error("scene {0} is not loaded")]
    NotLoaded(StableId),

    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error("scene file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("scene JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl SceneError {
    /// Whether the error means the input document itself is bad, as opposed
    /// to the live world refusing it.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedDocument(_)
                | Self::UnknownComponent(_)
                | Self::DuplicateIdentifier(_)
                | Self::UnsupportedVersion { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failure_keeps_source() {
        let err = EcsError::BackendCreateFailure {
            id: StableId::from_u128(1),
            source: BackendError::InvalidShape("ball radius must be positive".into()),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("invalid collision shape: ball radius must be positive")
        );
    }

    #[test]
    fn malformed_class() {
        assert!(SceneError::UnknownComponent("Foo".into()).is_malformed());
        assert!(SceneError::UnsupportedVersion { found: 9, expected: 1 }.is_malformed());
        assert!(!SceneError::AlreadyLoaded(StableId::NIL).is_malformed());
    }
}
