//! # Entity — Generational Handles
//!
//! An [`Entity`] is a slot index paired with a generation counter. The
//! [`World`](super::world::World) maps it to the entity's record, components,
//! and tags. Handles are cheap to copy and never own anything.
//!
//! When an entity is destroyed its slot goes onto a free list and the slot's
//! generation is bumped. A later spawn may reuse the slot, but every handle
//! minted before the destroy still carries the old generation and is rejected
//! by [`EntityAllocator::is_alive`]:
//!
//! ```text
//! spawn      → Entity { index: 5, generation: 0 }
//! destroy    → slot 5 generation becomes 1, slot 5 freed
//! spawn      → Entity { index: 5, generation: 1 }
//! old handle → generation 0 ≠ 1 → not alive
//! ```
//!
//! Handles are not persistent. Saved scenes, physics bindings and
//! relationships use [`StableId`](super::StableId) instead.

use std::fmt;

/// A lightweight handle to an entity in a [`World`](super::world::World).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Entity {
    /// Slot index. Recycled after the entity is destroyed.
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Hands out entity slots and tracks which handles are still current.
pub(crate) struct EntityAllocator {
    slots: Vec<Slot>,
    /// Freed slot indices, reused LIFO.
    free: Vec<u32>,
    alive: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            alive: 0,
        }
    }

    /// Take a slot, preferring a recycled one.
    pub fn allocate(&mut self) -> Entity {
        self.alive += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return Entity {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            panic!("entity slot space exhausted ({} slots)", self.slots.len())
        });
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        Entity {
            index,
            generation: 0,
        }
    }

    /// Return a slot to the free list. Stale or already-freed handles are
    /// ignored and return `false`.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index);
        self.alive -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// The current handle for a live slot, if any.
    pub fn current(&self, index: u32) -> Option<Entity> {
        let slot = self.slots.get(index as usize)?;
        slot.alive.then_some(Entity {
            index,
            generation: slot.generation,
        })
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Number of slots ever created (alive or free).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
