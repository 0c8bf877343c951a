//! # Archetype — Entities Grouped by Component Set
//!
//! Every entity lives in exactly one archetype: the table for its exact set
//! of component kinds. Adding or removing a component moves the entity's row
//! to another table.
//!
//! ```text
//! Archetype [Transform, Velocity3D]
//!
//!   Transform:  [t0, t1, t2]
//!   Velocity3D: [v0, v1, v2]
//!   entities:   [e0, e1, e2]     ← row i of every column is entities[i]
//! ```
//!
//! Tags are not archetype members. They live in the entity record and a
//! per-kind index so that toggling a tag never moves component rows.

use std::any::TypeId;
use std::collections::HashMap;

use super::component::{BoxedComponent, ComponentColumn};
use super::entity::Entity;

/// Sorted, deduplicated component `TypeId`s. `(A, B)` and `(B, A)` map to the
/// same key.
pub(crate) type ArchetypeKey = Vec<TypeId>;

pub(crate) fn archetype_key(mut type_ids: Vec<TypeId>) -> ArchetypeKey {
    type_ids.sort();
    type_ids.dedup();
    type_ids
}

pub(crate) struct Archetype {
    pub columns: HashMap<TypeId, ComponentColumn>,
    pub entities: Vec<Entity>,
}

impl Archetype {
    pub fn new(key: &ArchetypeKey) -> Self {
        Self {
            columns: key.iter().map(|&t| (t, ComponentColumn::new())).collect(),
            entities: Vec::new(),
        }
    }

    pub fn has_component(&self, type_id: &TypeId) -> bool {
        self.columns.contains_key(type_id)
    }

    pub fn has_all(&self, type_ids: &[TypeId]) -> bool {
        type_ids.iter().all(|t| self.columns.contains_key(t))
    }

    /// Append a row. `values` must hold exactly one value per column.
    pub fn push_row(&mut self, entity: Entity, mut values: HashMap<TypeId, BoxedComponent>) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for (type_id, column) in &mut self.columns {
            let value = values
                .remove(type_id)
                .unwrap_or_else(|| panic!("archetype row for {entity:?} is missing a column value"));
            column.push_boxed(value);
        }
        row
    }

    /// Swap-remove the row at `row`, handing back its values and the entity
    /// that moved into `row` (if any).
    pub fn take_row(&mut self, row: usize) -> (HashMap<TypeId, BoxedComponent>, Option<Entity>) {
        let values = self
            .columns
            .iter_mut()
            .map(|(&type_id, column)| (type_id, column.take(row)))
            .collect();
        self.entities.swap_remove(row);
        let moved = self.entities.get(row).copied();
        (values, moved)
    }
}

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
    fn key_is_order_independent() {
        let a = archetype_key(vec![TypeId::of::<u8>(), TypeId::of::<u16>()]);
        let b = archetype_key(vec![TypeId::of::<u16>(), TypeId::of::<u8>(), TypeId::of::<u8>()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn take_row_reports_moved_entity() {
        let key = archetype_key(vec![TypeId::of::<u32>()]);
        let mut arch = Archetype::new(&key);
        for i in 0..3u32 {
            let values = HashMap::from([(TypeId::of::<u32>(), Box::new(i * 10) as BoxedComponent)]);
            arch.push_row(entity(i), values);
        }

        let (mut values, moved) = arch.take_row(0);
        let taken = values.remove(&TypeId::of::<u32>()).unwrap();
        assert_eq!(*taken.downcast::<u32>().unwrap(), 0);
        assert_eq!(moved, Some(entity(2)));
        assert_eq!(*arch.columns[&TypeId::of::<u32>()].get::<u32>(0), 20);

        let (_, moved) = arch.take_row(1);
        assert_eq!(moved, None);
    }
}
