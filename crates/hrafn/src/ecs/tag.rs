//! # Tags — Markers That Drive Dispatch
//!
//! A tag is a kind plus an optional short payload. Unlike components, tags
//! are not archetype members: toggling one never moves component rows, and
//! every toggle is recorded in the world's [`TagLog`].
//!
//! ## Exclusion groups
//!
//! ```text
//! physics source:  PxStatic | PxKinematic | PxDynamic | NonPx | ActiveExternalRef
//! world-unique:    ActiveCamera
//! ```
//!
//! Adding a tag from the physics-source group removes whichever member the
//! entity already has (with its own `Removed` event) before the new one is
//! attached. `ActiveCamera` is removed from every other entity first.
//!
//! ## Delta log
//!
//! Readers keep a [`TagCursor`] and pull new events with
//! [`World::read_tag_events`](super::World::read_tag_events). Each reader sees
//! each event once, regardless of how many other readers there are. Layers
//! that must react before the mutating call returns (the physics binding)
//! register a [`TagHook`] instead.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::entity::Entity;
use super::identity::StableId;
use super::world::World;
use crate::error::EcsError;

/// The kind of a tag. At most one tag of each kind per entity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKind {
    PxStatic,
    PxKinematic,
    PxDynamic,
    /// Explicitly non-physical. Same as having no physics tag.
    NonPx,
    /// Command: adopt the backend object named by the entity's
    /// `ExternalBody` component. Replaced by `ActiveExternalRef`.
    CreateExternalRef,
    ActiveExternalRef,
    /// Command: release the adopted backend object.
    DeleteExternalRef,
    Global,
    Local,
    ActiveCamera,
    Custom(String),
}

const CUSTOM_PREFIX: &str = "custom:";

impl TagKind {
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Stable name used in packed documents.
    pub fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Self::PxStatic => "PxStatic",
            Self::PxKinematic => "PxKinematic",
            Self::PxDynamic => "PxDynamic",
            Self::NonPx => "NonPx",
            Self::CreateExternalRef => "CreateExternalRef",
            Self::ActiveExternalRef => "ActiveExternalRef",
            Self::DeleteExternalRef => "DeleteExternalRef",
            Self::Global => "Global",
            Self::Local => "Local",
            Self::ActiveCamera => "ActiveCamera",
            Self::Custom(name) => return Cow::Owned(format!("{CUSTOM_PREFIX}{name}")),
        })
    }

    /// `PxStatic`, `PxKinematic`, or `PxDynamic`.
    pub fn is_physics(&self) -> bool {
        matches!(self, Self::PxStatic | Self::PxKinematic | Self::PxDynamic)
    }

    /// Member of the physics-source exclusion group.
    pub fn is_physics_source(&self) -> bool {
        self.is_physics() || matches!(self, Self::NonPx | Self::ActiveExternalRef)
    }

    /// Runtime-only tags, never written to a packed scene.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CreateExternalRef | Self::ActiveExternalRef | Self::DeleteExternalRef
        )
    }
}

impl fmt::Debug for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TagKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PxStatic" => Self::PxStatic,
            "PxKinematic" => Self::PxKinematic,
            "PxDynamic" => Self::PxDynamic,
            "NonPx" => Self::NonPx,
            "CreateExternalRef" => Self::CreateExternalRef,
            "ActiveExternalRef" => Self::ActiveExternalRef,
            "DeleteExternalRef" => Self::DeleteExternalRef,
            "Global" => Self::Global,
            "Local" => Self::Local,
            "ActiveCamera" => Self::ActiveCamera,
            other => match other.strip_prefix(CUSTOM_PREFIX) {
                Some(name) if !name.is_empty() => Self::Custom(name.to_owned()),
                _ => return Err(format!("unknown tag kind `{other}`")),
            },
        })
    }
}

impl Serialize for TagKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for TagKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Cow::<'de, str>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A tag instance: kind plus optional payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub kind: TagKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Tag {
    pub fn new(kind: TagKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

impl From<TagKind> for Tag {
    fn from(kind: TagKind) -> Self {
        Self::new(kind)
    }
}

// ── Delta log ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    Added,
    Removed,
}

/// One tag transition on one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEvent {
    /// Position in the world's log. Strictly increasing, never reused.
    pub sequence: u64,
    pub entity: Entity,
    pub id: StableId,
    pub tag: Tag,
    pub change: TagChange,
}

impl TagEvent {
    pub fn kind(&self) -> &TagKind {
        &self.tag.kind
    }
}

/// A reader's position in the tag log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagCursor {
    next: u64,
}

/// Events a world keeps before dropping the oldest.
pub const DEFAULT_TAG_LOG_CAPACITY: usize = 4096;

/// Record of tag transitions, bounded by a capacity.
///
/// When full, the older half is dropped. A cursor left behind by that skips
/// ahead to the oldest retained event, so readers that poll at least once
/// per `capacity / 2` transitions see everything.
#[derive(Debug)]
pub(crate) struct TagLog {
    events: Vec<TagEvent>,
    /// Sequence number of `events[0]`.
    first: u64,
    capacity: usize,
}

impl Default for TagLog {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            first: 0,
            capacity: DEFAULT_TAG_LOG_CAPACITY,
        }
    }
}

impl TagLog {
    pub fn push(&mut self, entity: Entity, id: StableId, tag: Tag, change: TagChange) -> TagEvent {
        if self.events.len() >= self.capacity {
            self.drop_oldest(self.events.len() - self.capacity / 2);
        }
        let event = TagEvent {
            sequence: self.first + self.events.len() as u64,
            entity,
            id,
            tag,
            change,
        };
        self.events.push(event.clone());
        event
    }

    /// Events not yet seen through `cursor`, advancing it past them.
    pub fn read(&self, cursor: &mut TagCursor) -> &[TagEvent] {
        let start = cursor.next.saturating_sub(self.first) as usize;
        let unseen = self.events.get(start..).unwrap_or(&[]);
        cursor.next = self.end();
        unseen
    }

    /// A cursor that will only see events pushed after this call.
    pub fn cursor_at_end(&self) -> TagCursor {
        TagCursor { next: self.end() }
    }

    pub fn clear(&mut self) {
        self.first = self.end();
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// At least one. Shrinking below the current length drops the oldest
    /// events right away.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        if self.events.len() > self.capacity {
            self.drop_oldest(self.events.len() - self.capacity);
        }
    }

    fn drop_oldest(&mut self, count: usize) {
        self.events.drain(..count);
        self.first += count as u64;
    }

    fn end(&self) -> u64 {
        self.first + self.events.len() as u64
    }
}

/// Synchronous observer run inside `add_tag`/`remove_tag` after the log is
/// updated. An error from an `Added` hook undoes the add and is returned to
/// the caller.
pub type TagHook = Arc<dyn Fn(&mut World, &TagEvent) -> Result<(), EcsError> + Send + Sync>;

/// Observer run for each entity of a destroyed subtree, after its tags are
/// gone and before its slot is reclaimed.
pub type DespawnHook = Arc<dyn Fn(&mut World, Entity, StableId) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32) -> Entity {
        Entity {
            index,
            generation: 0,
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in [
            TagKind::PxStatic,
            TagKind::ActiveExternalRef,
            TagKind::Local,
            TagKind::custom("enemy"),
        ] {
            assert_eq!(kind.name().parse::<TagKind>().unwrap(), kind);
        }
        assert_eq!(TagKind::custom("enemy").name(), "custom:enemy");
        assert!("custom:".parse::<TagKind>().is_err());
        assert!("Flying".parse::<TagKind>().is_err());
    }

    #[test]
    fn tag_serializes_kind_as_string() {
        let tag = Tag::new(TagKind::PxDynamic);
        assert_eq!(serde_json::to_string(&tag).unwrap(), r#"{"kind":"PxDynamic"}"#);
        let tag = Tag::new(TagKind::custom("door")).with_payload("north");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(serde_json::from_str::<Tag>(&json).unwrap(), tag);
    }

    #[test]
    fn groups() {
        assert!(TagKind::PxKinematic.is_physics());
        assert!(!TagKind::NonPx.is_physics());
        assert!(TagKind::NonPx.is_physics_source());
        assert!(TagKind::ActiveExternalRef.is_physics_source());
        assert!(!TagKind::ActiveCamera.is_physics_source());
        assert!(TagKind::DeleteExternalRef.is_transient());
        assert!(!TagKind::Global.is_transient());
    }

    #[test]
    fn independent_cursors_each_see_events_once() {
        let mut log = TagLog::default();
        let mut a = TagCursor::default();
        log.push(entity(0), StableId::NIL, TagKind::Local.into(), TagChange::Added);

        let mut b = log.cursor_at_end();
        log.push(entity(1), StableId::NIL, TagKind::Global.into(), TagChange::Added);

        assert_eq!(log.read(&mut a).len(), 2);
        assert_eq!(log.read(&mut a).len(), 0);
        let seen = log.read(&mut b);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].sequence, 1);
    }

    #[test]
    fn clear_keeps_sequence_numbers_monotonic() {
        let mut log = TagLog::default();
        let mut cursor = TagCursor::default();
        log.push(entity(0), StableId::NIL, TagKind::Local.into(), TagChange::Added);
        log.clear();
        let event = log.push(entity(0), StableId::NIL, TagKind::Local.into(), TagChange::Removed);
        assert_eq!(event.sequence, 1);
        let seen = log.read(&mut cursor);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].change, TagChange::Removed);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn full_log_drops_its_older_half() {
        let mut log = TagLog::default();
        log.set_capacity(8);
        let mut cursor = log.cursor_at_end();
        for _ in 0..8 {
            log.push(entity(0), StableId::NIL, Tag::new(TagKind::Global), TagChange::Added);
        }
        assert_eq!(log.len(), 8);
        log.push(entity(0), StableId::NIL, Tag::new(TagKind::Global), TagChange::Removed);
        assert_eq!(log.len(), 5);

        let seen = log.read(&mut cursor);
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0].sequence, 4);
        assert_eq!(seen[4].change, TagChange::Removed);
        assert!(log.read(&mut cursor).is_empty());
    }

    #[test]
    fn shrinking_capacity_trims_immediately() {
        let mut log = TagLog::default();
        for _ in 0..10 {
            log.push(entity(1), StableId::NIL, Tag::new(TagKind::Local), TagChange::Added);
        }
        log.set_capacity(3);
        assert_eq!(log.len(), 3);
        let mut cursor = TagCursor::default();
        assert_eq!(log.read(&mut cursor)[0].sequence, 7);
        log.set_capacity(0);
        assert_eq!(log.capacity(), 1);
    }
}
