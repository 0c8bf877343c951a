//! # World — The Entity Store
//!
//! The [`World`] owns every entity record, component, tag, relation, and
//! resource. It is the single source of truth the physics binding and the
//! scene packer read from.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ World                                                        │
//! │                                                              │
//! │  allocator:  slot index + generation per entity              │
//! │  ids:        StableId ↔ Entity                               │
//! │                                                              │
//! │  records:    slot index → EntityRecord                       │
//! │    id, name, enabled, parent, children (ordered),            │
//! │    tags (by kind), relations (by name),                      │
//! │    archetype key + row                                       │
//! │                                                              │
//! │  archetypes: sorted [TypeId] → Archetype { columns, rows }   │
//! │  tag_index:  TagKind → entities carrying it                  │
//! │  tag_log:    bounded TagEvent stream + sync hooks            │
//! │  resources:  TypeId → singleton                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Destroy order
//!
//! `destroy_entity` walks the subtree children-first. For each node it
//! removes every tag through the normal path (so hooks and log readers see
//! each removal), runs the despawn hooks, releases the identifier, and only
//! then frees the slot. A physics object bound to the entity is therefore
//! gone before the slot can be handed out again.
//!
//! ## Resources
//!
//! Singletons keyed by type. A layer that needs its own state and the world
//! at the same time takes its resource out with [`World::resource_remove`]
//! and puts it back with [`World::insert_resource`].

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::archetype::{Archetype, ArchetypeKey, archetype_key};
use super::component::{BoxedComponent, Component};
use super::entity::{Entity, EntityAllocator};
use super::identity::{IdRegistry, StableId};
use super::query::{Query, QueryParam, Signature};
use super::relation::{PendingRelation, Relation, RelationTarget};
use super::tag::{DespawnHook, Tag, TagChange, TagCursor, TagEvent, TagHook, TagKind, TagLog};
use crate::error::EcsError;

struct EntityRecord {
    id: StableId,
    archetype: ArchetypeKey,
    row: usize,
    name: Option<String>,
    enabled: bool,
    parent: Option<Entity>,
    children: Vec<Entity>,
    tags: BTreeMap<TagKind, Tag>,
    relations: BTreeMap<String, Relation>,
}

/// The entity store.
pub struct World {
    allocator: EntityAllocator,
    records: HashMap<u32, EntityRecord>,
    archetypes: HashMap<ArchetypeKey, Archetype>,
    ids: IdRegistry,
    /// Names are not unique; every carrier is listed.
    names: HashMap<String, Vec<Entity>>,
    tag_index: HashMap<TagKind, HashSet<Entity>>,
    tag_log: TagLog,
    tag_hooks: Vec<TagHook>,
    despawn_hooks: Vec<DespawnHook>,
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            records: HashMap::new(),
            archetypes: HashMap::new(),
            ids: IdRegistry::new(),
            names: HashMap::new(),
            tag_index: HashMap::new(),
            tag_log: TagLog::default(),
            tag_hooks: Vec::new(),
            despawn_hooks: Vec::new(),
            resources: HashMap::new(),
        }
    }

    fn live(&self, entity: Entity) -> Option<&EntityRecord> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        self.records.get(&entity.index)
    }

    fn record(&self, entity: Entity) -> Result<&EntityRecord, EcsError> {
        self.live(entity).ok_or(EcsError::InvalidHandle(entity))
    }

    fn record_mut(&mut self, entity: Entity) -> Result<&mut EntityRecord, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::InvalidHandle(entity));
        }
        self.records
            .get_mut(&entity.index)
            .ok_or(EcsError::InvalidHandle(entity))
    }

    // ── Resources ────────────────────────────────────────────────────

    /// Insert a singleton, replacing any existing one of the same type.
    pub fn insert_resource<T: 'static + Send + Sync>(&mut self, value: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource<T: 'static + Send + Sync>(&self) -> &T {
        self.get_resource::<T>().unwrap_or_else(|| {
            panic!(
                "Resource `{}` not found. Did you forget to insert it?",
                std::any::type_name::<T>()
            )
        })
    }

    pub fn get_resource<T: 'static + Send + Sync>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|r| r.downcast_ref::<T>())
    }

    pub fn get_resource_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|r| r.downcast_mut::<T>())
    }

    pub fn has_resource<T: 'static + Send + Sync>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    /// Take a resource out of the world. Pair with [`insert_resource`] to
    /// hold the resource and `&mut World` at the same time.
    ///
    /// [`insert_resource`]: World::insert_resource
    pub fn resource_remove<T: 'static + Send + Sync>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|r| r.downcast::<T>().ok())
            .map(|b| *b)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create an entity with a fresh identifier, as a root or as the last
    /// child of `parent`.
    pub fn create_entity(&mut self, parent: Option<Entity>) -> Result<Entity, EcsError> {
        let id = self.ids.allocate();
        self.create_entity_with_id(id, parent)
    }

    /// Create an entity carrying a given identifier. A nil identifier is
    /// replaced with a fresh one.
    pub fn create_entity_with_id(
        &mut self,
        id: StableId,
        parent: Option<Entity>,
    ) -> Result<Entity, EcsError> {
        if let Some(parent) = parent {
            self.record(parent)?;
        }
        let id = if id.is_nil() { self.ids.allocate() } else { id };
        if self.ids.contains(id) {
            return Err(EcsError::IdentifierInUse(id));
        }
        let entity = self.allocate(id, parent);
        self.ids.register(id, entity)?;
        Ok(entity)
    }

    /// Slot, empty archetype row, record, and parent link. Caller has
    /// validated `parent` and reserved `id`.
    fn allocate(&mut self, id: StableId, parent: Option<Entity>) -> Entity {
        let entity = self.allocator.allocate();
        let key = archetype_key(Vec::new());
        let row = self
            .archetypes
            .entry(key.clone())
            .or_insert_with(|| Archetype::new(&key))
            .push_row(entity, HashMap::new());
        self.records.insert(
            entity.index,
            EntityRecord {
                id,
                archetype: key,
                row,
                name: None,
                enabled: true,
                parent,
                children: Vec::new(),
                tags: BTreeMap::new(),
                relations: BTreeMap::new(),
            },
        );
        if let Some(record) = parent.and_then(|p| self.records.get_mut(&p.index)) {
            record.children.push(entity);
        }
        entity
    }

    /// Spawn a root entity with a bundle of components.
    pub fn spawn<B: SpawnBundle>(&mut self, bundle: B) -> Entity {
        let id = self.ids.allocate();
        let entity = self.allocate(id, None);
        if let Err(err) = self.ids.register(id, entity) {
            log::warn!("spawned {entity} without an identifier: {err}");
        }
        bundle.insert_into(self, entity);
        entity
    }

    /// Spawn an entity with a bundle as the last child of `parent`.
    pub fn spawn_child<B: SpawnBundle>(&mut self, parent: Entity, bundle: B) -> Result<Entity, EcsError> {
        let entity = self.create_entity(Some(parent))?;
        bundle.insert_into(self, entity);
        Ok(entity)
    }

    /// Destroy `entity` and its whole subtree, children first.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        let parent = self.record(entity)?.parent;
        if let Some(record) = parent.and_then(|p| self.records.get_mut(&p.index)) {
            record.children.retain(|&c| c != entity);
        }

        let order = self.subtree_post_order(entity);
        for &node in &order {
            self.destroy_one(node);
        }
        log::debug!("destroyed {entity} ({} entities)", order.len());
        Ok(())
    }

    fn subtree_post_order(&self, root: Entity) -> Vec<Entity> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((entity, expanded)) = stack.pop() {
            if expanded {
                order.push(entity);
                continue;
            }
            stack.push((entity, true));
            if let Some(record) = self.live(entity) {
                stack.extend(record.children.iter().rev().map(|&c| (c, false)));
            }
        }
        order
    }

    fn destroy_one(&mut self, entity: Entity) {
        let kinds: Vec<TagKind> = match self.live(entity) {
            Some(record) => record.tags.keys().cloned().collect(),
            None => return,
        };
        for kind in kinds {
            if let Err(err) = self.remove_tag(entity, &kind) {
                log::warn!("tag hook failed while destroying {entity}: {err}");
            }
        }

        let Some(id) = self.live(entity).map(|r| r.id) else {
            return;
        };
        let hooks = self.despawn_hooks.clone();
        for hook in &hooks {
            hook(self, entity, id);
        }

        if !self.allocator.is_alive(entity) {
            return;
        }
        let Some(record) = self.records.remove(&entity.index) else {
            return;
        };
        self.detach_row(&record.archetype, record.row);
        self.ids.release(record.id);
        if let Some(name) = &record.name {
            self.unindex_name(name, entity);
        }
        self.allocator.deallocate(entity);
    }

    /// Whether the handle still refers to a live entity.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.live(entity).is_some()
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Every live entity, in slot order.
    pub fn entities(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self
            .records
            .keys()
            .filter_map(|&index| self.allocator.current(index))
            .collect();
        all.sort();
        all
    }

    // ── Identity, name, enabled ──────────────────────────────────────

    pub fn id(&self, entity: Entity) -> Result<StableId, EcsError> {
        Ok(self.record(entity)?.id)
    }

    /// The live entity carrying `id`. `None` for dangling identifiers.
    pub fn resolve(&self, id: StableId) -> Option<Entity> {
        self.ids.resolve(id)
    }

    pub fn ids(&self) -> &IdRegistry {
        &self.ids
    }

    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.live(entity)?.name.as_deref()
    }

    /// Set or clear the entity's name.
    pub fn set_name(&mut self, entity: Entity, name: Option<String>) -> Result<(), EcsError> {
        let previous = std::mem::replace(&mut self.record_mut(entity)?.name, name.clone());
        if let Some(previous) = previous {
            self.unindex_name(&previous, entity);
        }
        if let Some(name) = name {
            self.names.entry(name).or_default().push(entity);
        }
        Ok(())
    }

    /// All live entities carrying `name`, in naming order.
    pub fn find_by_name(&self, name: &str) -> &[Entity] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn unindex_name(&mut self, name: &str, entity: Entity) {
        if let Some(list) = self.names.get_mut(name) {
            list.retain(|&e| e != entity);
            if list.is_empty() {
                self.names.remove(name);
            }
        }
    }

    /// Dead entities report `false`.
    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.live(entity).is_some_and(|r| r.enabled)
    }

    /// Disabled entities are skipped by queries unless a signature asks for
    /// them.
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> Result<(), EcsError> {
        self.record_mut(entity)?.enabled = enabled;
        Ok(())
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.live(entity)?.parent
    }

    /// Children in sibling order. Empty for dead entities.
    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.live(entity).map(|r| r.children.as_slice()).unwrap_or(&[])
    }

    /// Live entities without a parent, in slot order.
    pub fn roots(&self) -> Vec<Entity> {
        self.entities()
            .into_iter()
            .filter(|&e| self.parent(e).is_none())
            .collect()
    }

    /// Move `child` under `parent` (appended last) or make it a root.
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> Result<(), EcsError> {
        let previous = self.record(child)?.parent;
        if let Some(parent) = parent {
            self.record(parent)?;
            if parent == child || self.is_ancestor(child, parent) {
                return Err(EcsError::HierarchyCycle { child, parent });
            }
        }
        if previous == parent {
            return Ok(());
        }
        if let Some(record) = previous.and_then(|p| self.records.get_mut(&p.index)) {
            record.children.retain(|&c| c != child);
        }
        if let Some(record) = parent.and_then(|p| self.records.get_mut(&p.index)) {
            record.children.push(child);
        }
        self.record_mut(child)?.parent = parent;
        Ok(())
    }

    /// Whether `ancestor` is somewhere above `entity`.
    pub fn is_ancestor(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut current = self.parent(entity);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    // ── Components ───────────────────────────────────────────────────

    /// Attach a component. An existing value of the same kind is replaced
    /// and returned.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<Option<T>, EcsError> {
        self.record(entity)?;
        let previous = self.put(entity, TypeId::of::<T>(), Box::new(component));
        Ok(previous.and_then(|b| b.downcast::<T>().ok()).map(|b| *b))
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<Option<T>, EcsError> {
        self.record(entity)?;
        let removed = self.take(entity, TypeId::of::<T>());
        Ok(removed.and_then(|b| b.downcast::<T>().ok()).map(|b| *b))
    }

    /// `None` if the entity is dead or lacks the component.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let record = self.live(entity)?;
        let column = self.archetypes.get(&record.archetype)?.columns.get(&TypeId::of::<T>())?;
        Some(column.get::<T>(record.row))
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let (key, row) = self.live(entity).map(|r| (r.archetype.clone(), r.row))?;
        let column = self.archetypes.get_mut(&key)?.columns.get_mut(&TypeId::of::<T>())?;
        Some(column.get_mut::<T>(row))
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.live(entity)
            .is_some_and(|r| r.archetype.contains(&TypeId::of::<T>()))
    }

    /// Component kinds on the entity, sorted by `TypeId`.
    pub fn component_types(&self, entity: Entity) -> &[TypeId] {
        self.live(entity).map(|r| r.archetype.as_slice()).unwrap_or(&[])
    }

    pub fn get_any(&self, entity: Entity, type_id: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        let record = self.live(entity)?;
        let column = self.archetypes.get(&record.archetype)?.columns.get(&type_id)?;
        Some(column.get_any(record.row))
    }

    /// Type-erased insert for the scene unpacker.
    pub(crate) fn add_boxed_component(
        &mut self,
        entity: Entity,
        type_id: TypeId,
        component: BoxedComponent,
    ) -> Result<Option<BoxedComponent>, EcsError> {
        self.record(entity)?;
        Ok(self.put(entity, type_id, component))
    }

    fn put(&mut self, entity: Entity, type_id: TypeId, value: BoxedComponent) -> Option<BoxedComponent> {
        let (key, row) = self.records.get(&entity.index).map(|r| (r.archetype.clone(), r.row))?;
        if let Some(column) = self
            .archetypes
            .get_mut(&key)
            .and_then(|a| a.columns.get_mut(&type_id))
        {
            return Some(column.replace(row, value));
        }

        let mut widened = key.clone();
        widened.push(type_id);
        let mut values = self.detach_row(&key, row);
        values.insert(type_id, value);
        self.attach_row(entity, archetype_key(widened), values);
        None
    }

    fn take(&mut self, entity: Entity, type_id: TypeId) -> Option<BoxedComponent> {
        let (key, row) = self.records.get(&entity.index).map(|r| (r.archetype.clone(), r.row))?;
        if !key.contains(&type_id) {
            return None;
        }
        let narrowed: ArchetypeKey = key.iter().copied().filter(|&t| t != type_id).collect();
        let mut values = self.detach_row(&key, row);
        let removed = values.remove(&type_id);
        self.attach_row(entity, narrowed, values);
        removed
    }

    fn detach_row(&mut self, key: &ArchetypeKey, row: usize) -> HashMap<TypeId, BoxedComponent> {
        let Some(archetype) = self.archetypes.get_mut(key) else {
            return HashMap::new();
        };
        let (values, moved) = archetype.take_row(row);
        if let Some(record) = moved.and_then(|m| self.records.get_mut(&m.index)) {
            record.row = row;
        }
        values
    }

    fn attach_row(&mut self, entity: Entity, key: ArchetypeKey, values: HashMap<TypeId, BoxedComponent>) {
        let row = self
            .archetypes
            .entry(key.clone())
            .or_insert_with(|| Archetype::new(&key))
            .push_row(entity, values);
        if let Some(record) = self.records.get_mut(&entity.index) {
            record.archetype = key;
            record.row = row;
        }
    }

    // ── Tags ─────────────────────────────────────────────────────────

    /// Attach a tag.
    ///
    /// Re-adding a kind the entity already has only updates the payload and
    /// emits nothing. Otherwise rivals in the tag's exclusion group are
    /// removed first, the tag is logged as `Added`, and the tag hooks run.
    /// If a hook fails the tag is removed again and the hook's error is
    /// returned.
    pub fn add_tag(&mut self, entity: Entity, tag: impl Into<Tag>) -> Result<(), EcsError> {
        let tag = tag.into();
        let record = self.record_mut(entity)?;
        if let Some(existing) = record.tags.get_mut(&tag.kind) {
            existing.payload = tag.payload;
            return Ok(());
        }

        if tag.kind.is_physics_source() {
            let rivals: Vec<TagKind> = record
                .tags
                .keys()
                .filter(|k| k.is_physics_source())
                .cloned()
                .collect();
            for rival in rivals {
                self.remove_tag(entity, &rival)?;
            }
        }
        if tag.kind == TagKind::ActiveCamera {
            for other in self.tagged(&TagKind::ActiveCamera) {
                if other != entity {
                    self.remove_tag(other, &TagKind::ActiveCamera)?;
                }
            }
        }

        let record = self.record_mut(entity)?;
        let id = record.id;
        record.tags.insert(tag.kind.clone(), tag.clone());
        self.tag_index.entry(tag.kind.clone()).or_default().insert(entity);
        let event = self.tag_log.push(entity, id, tag, TagChange::Added);

        if let Err(err) = self.run_tag_hooks(&event) {
            log::debug!("{} on {entity} rejected: {err}", event.tag.kind);
            if self.has_tag(entity, &event.tag.kind) {
                if let Err(undo) = self.remove_tag(entity, &event.tag.kind) {
                    log::warn!("undoing {} on {entity} failed: {undo}", event.tag.kind);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Detach a tag, returning it. Removing a tag the entity lacks is a
    /// no-op and emits nothing.
    pub fn remove_tag(&mut self, entity: Entity, kind: &TagKind) -> Result<Option<Tag>, EcsError> {
        let record = self.record_mut(entity)?;
        let Some(tag) = record.tags.remove(kind) else {
            return Ok(None);
        };
        let id = record.id;
        if let Some(set) = self.tag_index.get_mut(kind) {
            set.remove(&entity);
            if set.is_empty() {
                self.tag_index.remove(kind);
            }
        }
        let event = self.tag_log.push(entity, id, tag.clone(), TagChange::Removed);
        self.run_tag_hooks(&event)?;
        Ok(Some(tag))
    }

    fn run_tag_hooks(&mut self, event: &TagEvent) -> Result<(), EcsError> {
        let hooks = self.tag_hooks.clone();
        for hook in &hooks {
            hook(self, event)?;
        }
        Ok(())
    }

    pub fn has_tag(&self, entity: Entity, kind: &TagKind) -> bool {
        self.live(entity).is_some_and(|r| r.tags.contains_key(kind))
    }

    pub fn tag(&self, entity: Entity, kind: &TagKind) -> Option<&Tag> {
        self.live(entity)?.tags.get(kind)
    }

    /// Tags on the entity, ordered by kind.
    pub fn tags(&self, entity: Entity) -> impl Iterator<Item = &Tag> + '_ {
        self.live(entity).into_iter().flat_map(|r| r.tags.values())
    }

    /// Every entity carrying `kind`, in slot order.
    pub fn tagged(&self, kind: &TagKind) -> Vec<Entity> {
        let mut found: Vec<Entity> = self
            .tag_index
            .get(kind)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        found.sort();
        found
    }

    /// Register a hook run synchronously on every tag transition.
    pub fn add_tag_hook(
        &mut self,
        hook: impl Fn(&mut World, &TagEvent) -> Result<(), EcsError> + Send + Sync + 'static,
    ) {
        self.tag_hooks.push(Arc::new(hook));
    }

    /// Register a hook run for each destroyed entity before its slot is
    /// reclaimed.
    pub fn add_despawn_hook(&mut self, hook: impl Fn(&mut World, Entity, StableId) + Send + Sync + 'static) {
        self.despawn_hooks.push(Arc::new(hook));
    }

    /// Events this cursor has not seen yet.
    pub fn read_tag_events(&self, cursor: &mut TagCursor) -> &[TagEvent] {
        self.tag_log.read(cursor)
    }

    /// A cursor that skips everything already in the log.
    pub fn tag_cursor(&self) -> TagCursor {
        self.tag_log.cursor_at_end()
    }

    /// Drop logged events. Sequence numbers keep counting.
    pub fn clear_tag_events(&mut self) {
        self.tag_log.clear();
    }

    /// Events currently retained in the log.
    pub fn tag_log_len(&self) -> usize {
        self.tag_log.len()
    }

    pub fn tag_log_capacity(&self) -> usize {
        self.tag_log.capacity()
    }

    /// Bound the log. Once full it drops its older half, and cursors that
    /// fell behind skip to the oldest retained event.
    pub fn set_tag_log_capacity(&mut self, capacity: usize) {
        self.tag_log.set_capacity(capacity);
    }

    // ── Relations ────────────────────────────────────────────────────

    /// Set the relation `name` on `entity`, returning the one it replaces.
    pub fn add_relation(
        &mut self,
        entity: Entity,
        name: impl Into<String>,
        relation: Relation,
    ) -> Result<Option<Relation>, EcsError> {
        Ok(self.record_mut(entity)?.relations.insert(name.into(), relation))
    }

    pub fn remove_relation(&mut self, entity: Entity, name: &str) -> Result<Option<Relation>, EcsError> {
        Ok(self.record_mut(entity)?.relations.remove(name))
    }

    pub fn relation(&self, entity: Entity, name: &str) -> Option<&Relation> {
        self.live(entity)?.relations.get(name)
    }

    /// Relations on the entity, ordered by name.
    pub fn relations(&self, entity: Entity) -> impl Iterator<Item = (&str, &Relation)> + '_ {
        self.live(entity)
            .into_iter()
            .flat_map(|r| r.relations.iter().map(|(name, rel)| (name.as_str(), rel)))
    }

    /// Look the relation's target up in the identifier registry. `None` if
    /// the entity is dead or has no relation of that name.
    pub fn resolve_relation(&self, entity: Entity, name: &str) -> Option<RelationTarget> {
        let target = self.relation(entity, name)?.target;
        Some(match self.ids.resolve(target) {
            Some(resolved) => RelationTarget::Resolved(resolved),
            None => RelationTarget::Pending(target),
        })
    }

    /// Every relation in the world whose target is not live.
    pub fn pending_relations(&self) -> Vec<PendingRelation> {
        let mut pending = Vec::new();
        for source in self.entities() {
            for (name, relation) in self.relations(source) {
                if !self.ids.contains(relation.target) {
                    pending.push(PendingRelation {
                        source,
                        name: name.to_owned(),
                        target: relation.target,
                    });
                }
            }
        }
        pending
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Run `f` for every enabled entity that has all of `Q`'s components.
    ///
    /// ```ignore
    /// world.query::<(&mut Transform, &Velocity3D)>(|_, (t, v)| {
    ///     t.translation += v.0 * dt;
    /// });
    /// ```
    pub fn query<Q: QueryParam>(&mut self, mut f: impl FnMut(Entity, Q::Item<'_>)) {
        let required = Q::type_ids();
        let records = &self.records;
        for archetype in self.archetypes.values_mut() {
            if archetype.entities.is_empty() || !archetype.has_all(&required) {
                continue;
            }
            let mut cols = Q::extract(&mut archetype.columns);
            for (row, &entity) in archetype.entities.iter().enumerate() {
                if records.get(&entity.index).is_some_and(|r| r.enabled) {
                    f(entity, Q::fetch(&mut cols, row));
                }
            }
            Q::restore(cols, &mut archetype.columns);
        }
    }

    /// Entities whose components and tags are a superset of `signature`.
    pub fn query_entities(&self, signature: &Signature) -> Query<'_> {
        let archetypes = self
            .archetypes
            .values()
            .filter(|a| !a.entities.is_empty() && a.has_all(&signature.components))
            .collect();
        Query::new(self, archetypes, signature.clone())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("archetypes", &self.archetypes.len())
            .field("resources", &self.resources.len())
            .field("tag_events", &self.tag_log.len())
            .finish()
    }
}

// ── Spawn bundles ────────────────────────────────────────────────────────

/// A tuple of components inserted together by [`World::spawn`].
pub trait SpawnBundle {
    fn insert_into(self, world: &mut World, entity: Entity);
}

macro_rules! impl_spawn_bundle {
    ($($T:ident),+) => {
        impl<$($T: Component),+> SpawnBundle for ($($T,)+) {
            #[allow(non_snake_case)]
            fn insert_into(self, world: &mut World, entity: Entity) {
                let ($($T,)+) = self;
                $(world.put(entity, TypeId::of::<$T>(), Box::new($T));)+
            }
        }
    };
}

impl_spawn_bundle!(A);
impl_spawn_bundle!(A, B);
impl_spawn_bundle!(A, B, C);
impl_spawn_bundle!(A, B, C, D);
impl_spawn_bundle!(A, B, C, D, E);
impl_spawn_bundle!(A, B, C, D, E, F);
impl_spawn_bundle!(A, B, C, D, E, F, G);
impl_spawn_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::components::{Position3D, Velocity3D};
    use crate::math::Vec3;

    #[test]
    fn created_entity_is_valid_until_destroyed() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        assert!(world.is_valid(e));
        world.destroy_entity(e).unwrap();
        assert!(!world.is_valid(e));
        assert!(matches!(world.destroy_entity(e), Err(EcsError::InvalidHandle(_))));
    }

    #[test]
    fn stale_handle_does_not_alias_new_occupant() {
        let mut world = World::new();
        let old = world.spawn((Position3D::new(1.0, 0.0, 0.0),));
        world.destroy_entity(old).unwrap();
        let new = world.spawn((Position3D::new(2.0, 0.0, 0.0),));
        assert_eq!(new.index(), old.index());
        assert!(world.get::<Position3D>(old).is_none());
        assert!(matches!(
            world.add_component(old, Velocity3D::default()),
            Err(EcsError::InvalidHandle(_))
        ));
        assert_eq!(world.get::<Position3D>(new).unwrap().0.x, 2.0);
    }

    #[test]
    fn identifiers_are_registered_and_released() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        let id = world.id(e).unwrap();
        assert_eq!(world.resolve(id), Some(e));
        world.destroy_entity(e).unwrap();
        assert_eq!(world.resolve(id), None);
        let fresh = world.create_entity(None).unwrap();
        assert_ne!(world.id(fresh).unwrap(), id);
    }

    #[test]
    fn explicit_identifier_clash_is_rejected() {
        let mut world = World::new();
        let id = StableId::from_u128(77);
        world.create_entity_with_id(id, None).unwrap();
        assert!(matches!(
            world.create_entity_with_id(id, None),
            Err(EcsError::IdentifierInUse(_))
        ));
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn add_component_replaces_and_returns_previous() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        assert_eq!(world.add_component(e, Velocity3D::new(1.0, 0.0, 0.0)).unwrap(), None);
        let previous = world.add_component(e, Velocity3D::new(2.0, 0.0, 0.0)).unwrap();
        assert_eq!(previous, Some(Velocity3D::new(1.0, 0.0, 0.0)));
        assert_eq!(world.get::<Velocity3D>(e), Some(&Velocity3D::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn archetype_moves_keep_other_rows_intact() {
        let mut world = World::new();
        let a = world.spawn((Position3D::new(1.0, 0.0, 0.0),));
        let b = world.spawn((Position3D::new(2.0, 0.0, 0.0),));
        let c = world.spawn((Position3D::new(3.0, 0.0, 0.0),));

        world.add_component(a, Velocity3D::default()).unwrap();
        assert_eq!(world.get::<Position3D>(a).unwrap().0.x, 1.0);
        assert_eq!(world.get::<Position3D>(b).unwrap().0.x, 2.0);
        assert_eq!(world.get::<Position3D>(c).unwrap().0.x, 3.0);

        let removed = world.remove_component::<Position3D>(c).unwrap();
        assert_eq!(removed.unwrap().0.x, 3.0);
        assert!(!world.has_component::<Position3D>(c));
        assert_eq!(world.remove_component::<Position3D>(c).unwrap(), None);
        assert_eq!(world.get::<Position3D>(b).unwrap().0.x, 2.0);
    }

    #[test]
    fn destroy_cascades_children_first() {
        let mut world = World::new();
        let root = world.create_entity(None).unwrap();
        let child = world.create_entity(Some(root)).unwrap();
        let grandchild = world.create_entity(Some(child)).unwrap();
        let sibling = world.create_entity(Some(root)).unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        world.add_despawn_hook(move |_, entity, _| seen.lock().unwrap().push(entity));

        world.destroy_entity(root).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![grandchild, child, sibling, root]);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn destroying_child_unlinks_it_from_parent() {
        let mut world = World::new();
        let root = world.create_entity(None).unwrap();
        let a = world.create_entity(Some(root)).unwrap();
        let b = world.create_entity(Some(root)).unwrap();
        world.destroy_entity(a).unwrap();
        assert_eq!(world.children(root), &[b]);
    }

    #[test]
    fn set_parent_reorders_and_rejects_cycles() {
        let mut world = World::new();
        let a = world.create_entity(None).unwrap();
        let b = world.create_entity(Some(a)).unwrap();
        let c = world.create_entity(Some(b)).unwrap();

        assert!(matches!(
            world.set_parent(a, Some(c)),
            Err(EcsError::HierarchyCycle { .. })
        ));
        assert!(matches!(
            world.set_parent(a, Some(a)),
            Err(EcsError::HierarchyCycle { .. })
        ));

        world.set_parent(c, Some(a)).unwrap();
        assert_eq!(world.children(a), &[b, c]);
        assert!(world.children(b).is_empty());

        world.set_parent(b, None).unwrap();
        assert_eq!(world.parent(b), None);
        assert_eq!(world.roots(), vec![a, b]);
    }

    #[test]
    fn physics_tags_are_mutually_exclusive() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        world.add_tag(e, TagKind::PxStatic).unwrap();
        world.add_tag(e, TagKind::PxDynamic).unwrap();
        assert!(!world.has_tag(e, &TagKind::PxStatic));
        assert!(world.has_tag(e, &TagKind::PxDynamic));

        world.add_tag(e, TagKind::NonPx).unwrap();
        assert!(!world.has_tag(e, &TagKind::PxDynamic));
        assert!(world.tagged(&TagKind::PxDynamic).is_empty());
    }

    #[test]
    fn tag_events_record_exclusion_order() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        let mut cursor = world.tag_cursor();
        world.add_tag(e, TagKind::PxStatic).unwrap();
        world.add_tag(e, TagKind::PxStatic).unwrap();
        world.add_tag(e, TagKind::PxDynamic).unwrap();

        let seen: Vec<_> = world
            .read_tag_events(&mut cursor)
            .iter()
            .map(|ev| (ev.kind().clone(), ev.change))
            .collect();
        assert_eq!(
            seen,
            vec![
                (TagKind::PxStatic, TagChange::Added),
                (TagKind::PxStatic, TagChange::Removed),
                (TagKind::PxDynamic, TagChange::Added),
            ]
        );
    }

    #[test]
    fn active_camera_is_unique() {
        let mut world = World::new();
        let a = world.create_entity(None).unwrap();
        let b = world.create_entity(None).unwrap();
        world.add_tag(a, TagKind::ActiveCamera).unwrap();
        world.add_tag(b, TagKind::ActiveCamera).unwrap();
        assert_eq!(world.tagged(&TagKind::ActiveCamera), vec![b]);
    }

    #[test]
    fn failing_hook_undoes_the_add() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        world.add_tag_hook(|_, event| {
            if event.change == TagChange::Added && *event.kind() == TagKind::custom("cursed") {
                return Err(EcsError::InvalidHandle(event.entity));
            }
            Ok(())
        });
        assert!(world.add_tag(e, TagKind::custom("cursed")).is_err());
        assert!(!world.has_tag(e, &TagKind::custom("cursed")));
    }

    #[test]
    fn repeated_add_updates_payload_silently() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        world.add_tag(e, Tag::new(TagKind::Local).with_payload("a")).unwrap();
        let mut cursor = world.tag_cursor();
        world.add_tag(e, Tag::new(TagKind::Local).with_payload("b")).unwrap();
        assert!(world.read_tag_events(&mut cursor).is_empty());
        assert_eq!(world.tag(e, &TagKind::Local).unwrap().payload.as_deref(), Some("b"));
    }

    #[test]
    fn tag_log_stays_bounded_under_churn() {
        let mut world = World::new();
        world.set_tag_log_capacity(64);
        let e = world.create_entity(None).unwrap();
        let mut cursor = world.tag_cursor();
        let mut seen = 0;
        for i in 0..1000 {
            world.add_tag(e, TagKind::Global).unwrap();
            world.remove_tag(e, &TagKind::Global).unwrap();
            assert!(world.tag_log_len() <= 64);
            if i % 10 == 0 {
                seen += world.read_tag_events(&mut cursor).len();
            }
        }
        seen += world.read_tag_events(&mut cursor).len();
        assert_eq!(seen, 2000);
    }

    #[test]
    fn destroy_emits_tag_removals() {
        let mut world = World::new();
        let e = world.create_entity(None).unwrap();
        world.add_tag(e, TagKind::Global).unwrap();
        let mut cursor = world.tag_cursor();
        world.destroy_entity(e).unwrap();
        let events = world.read_tag_events(&mut cursor);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change, TagChange::Removed);
        assert!(world.tagged(&TagKind::Global).is_empty());
    }

    #[test]
    fn names_are_not_unique() {
        let mut world = World::new();
        let a = world.create_entity(None).unwrap();
        let b = world.create_entity(None).unwrap();
        world.set_name(a, Some("crate".into())).unwrap();
        world.set_name(b, Some("crate".into())).unwrap();
        assert_eq!(world.find_by_name("crate"), &[a, b]);

        world.destroy_entity(a).unwrap();
        assert_eq!(world.find_by_name("crate"), &[b]);
        world.set_name(b, None).unwrap();
        assert!(world.find_by_name("crate").is_empty());
    }

    #[test]
    fn relations_resolve_lazily() {
        let mut world = World::new();
        let follower = world.create_entity(None).unwrap();
        let target_id = StableId::from_u128(500);
        world
            .add_relation(follower, "follows", Relation::new(target_id))
            .unwrap();

        assert_eq!(
            world.resolve_relation(follower, "follows"),
            Some(RelationTarget::Pending(target_id))
        );
        assert_eq!(world.pending_relations().len(), 1);

        let leader = world.create_entity_with_id(target_id, None).unwrap();
        assert_eq!(
            world.resolve_relation(follower, "follows"),
            Some(RelationTarget::Resolved(leader))
        );
        assert!(world.pending_relations().is_empty());
    }

    #[test]
    fn cyclic_relations_are_legal() {
        let mut world = World::new();
        let a = world.create_entity(None).unwrap();
        let b = world.create_entity(None).unwrap();
        let (ia, ib) = (world.id(a).unwrap(), world.id(b).unwrap());
        world.add_relation(a, "follows", Relation::new(ib)).unwrap();
        world.add_relation(b, "follows", Relation::new(ia)).unwrap();
        world.destroy_entity(a).unwrap();
        assert_eq!(
            world.resolve_relation(b, "follows"),
            Some(RelationTarget::Pending(ia))
        );
    }

    #[test]
    fn query_mutates_enabled_entities_only() {
        let mut world = World::new();
        let a = world.spawn((Position3D::default(), Velocity3D::new(1.0, 0.0, 0.0)));
        let b = world.spawn((Position3D::default(), Velocity3D::new(1.0, 0.0, 0.0)));
        world.set_enabled(b, false).unwrap();

        world.query::<(&mut Position3D, &Velocity3D)>(|_, (pos, vel)| {
            pos.0 += vel.0;
        });
        assert_eq!(world.get::<Position3D>(a).unwrap().0, Vec3::X);
        assert_eq!(world.get::<Position3D>(b).unwrap().0, Vec3::ZERO);
    }

    #[test]
    fn resource_remove_and_reinsert() {
        let mut world = World::new();
        world.insert_resource(5u32);
        let value = world.resource_remove::<u32>().unwrap();
        assert!(!world.has_resource::<u32>());
        world.insert_resource(value + 1);
        assert_eq!(*world.resource::<u32>(), 6);
    }
}
