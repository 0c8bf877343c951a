//! # Query — Iterating Entities by Signature
//!
//! Two ways in:
//!
//! - [`World::query`](super::World::query) hands typed component references
//!   to a closure. Columns are lifted out of the archetype for the duration
//!   of the walk so the borrow checker can see that `(&A, &mut B)` never
//!   aliases, then put back.
//!
//! - [`World::query_entities`](super::World::query_entities) takes a
//!   [`Signature`] (component kinds plus tag kinds) and returns a lazy
//!   [`Query`] over matching entity handles. Calling [`Query::iter`] again
//!   starts over.
//!
//! ```text
//! Signature { components: [Transform], tags: [PxDynamic] }
//!
//!   for archetype in world:
//!     skip unless archetype ⊇ components
//!     for entity in archetype:
//!       skip unless entity.tags ⊇ tags and entity is enabled
//!       yield entity
//! ```
//!
//! Order follows archetype storage. It holds steady across one walk as long
//! as nothing is spawned or destroyed; structural changes may reorder it.

use std::any::TypeId;
use std::collections::HashMap;

use super::archetype::Archetype;
use super::component::{Component, ComponentColumn};
use super::entity::Entity;
use super::tag::TagKind;
use super::world::World;

/// Something fetchable per row from an archetype: `&T`, `&mut T`, or a tuple
/// of those.
pub trait QueryParam {
    type Item<'w>;

    /// Columns lifted out of the archetype for the walk.
    type Column;

    fn type_ids() -> Vec<TypeId>;

    fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column;

    fn restore(col: Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>);

    fn fetch(col: &mut Self::Column, row: usize) -> Self::Item<'_>;
}

fn lift<T: Component>(columns: &mut HashMap<TypeId, ComponentColumn>) -> (TypeId, ComponentColumn) {
    let tid = TypeId::of::<T>();
    let col = columns.remove(&tid).unwrap_or_else(|| {
        panic!(
            "query column for `{}` missing from matched archetype",
            std::any::type_name::<T>()
        )
    });
    (tid, col)
}

impl<T: Component> QueryParam for &T {
    type Item<'w> = &'w T;
    type Column = (TypeId, ComponentColumn);

    fn type_ids() -> Vec<TypeId> {
        vec![TypeId::of::<T>()]
    }

    fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column {
        lift::<T>(columns)
    }

    fn restore(col: Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>) {
        columns.insert(col.0, col.1);
    }

    fn fetch(col: &mut Self::Column, row: usize) -> Self::Item<'_> {
        col.1.get::<T>(row)
    }
}

impl<T: Component> QueryParam for &mut T {
    type Item<'w> = &'w mut T;
    type Column = (TypeId, ComponentColumn);

    fn type_ids() -> Vec<TypeId> {
        vec![TypeId::of::<T>()]
    }

    fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column {
        lift::<T>(columns)
    }

    fn restore(col: Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>) {
        columns.insert(col.0, col.1);
    }

    fn fetch(col: &mut Self::Column, row: usize) -> Self::Item<'_> {
        col.1.get_mut::<T>(row)
    }
}

macro_rules! impl_query_param_tuple {
    ($($P:ident),+) => {
        impl<$($P: QueryParam),+> QueryParam for ($($P,)+) {
            type Item<'w> = ($($P::Item<'w>,)+);
            type Column = ($($P::Column,)+);

            fn type_ids() -> Vec<TypeId> {
                let mut ids = Vec::new();
                $(ids.extend($P::type_ids());)+
                ids
            }

            #[allow(non_snake_case)]
            fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column {
                ($($P::extract(columns),)+)
            }

            #[allow(non_snake_case)]
            fn restore(col: Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>) {
                let ($($P,)+) = col;
                $($P::restore($P, columns);)+
            }

            #[allow(non_snake_case)]
            fn fetch(col: &mut Self::Column, row: usize) -> Self::Item<'_> {
                let ($($P,)+) = col;
                ($($P::fetch($P, row),)+)
            }
        }
    };
}

impl_query_param_tuple!(A);
impl_query_param_tuple!(A, B);
impl_query_param_tuple!(A, B, C);
impl_query_param_tuple!(A, B, C, D);
impl_query_param_tuple!(A, B, C, D, E);
impl_query_param_tuple!(A, B, C, D, E, F);

// ── Signature queries ────────────────────────────────────────────────────

/// The set of component and tag kinds an entity must carry to match.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub(crate) components: Vec<TypeId>,
    pub(crate) tags: Vec<TagKind>,
    pub(crate) include_disabled: bool,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Component>(mut self) -> Self {
        self.components.push(TypeId::of::<T>());
        self
    }

    pub fn with_tag(mut self, kind: impl Into<TagKind>) -> Self {
        self.tags.push(kind.into());
        self
    }

    /// Also match disabled entities (skipped by default).
    pub fn include_disabled(mut self) -> Self {
        self.include_disabled = true;
        self
    }
}

/// A restartable view over the entities matching a [`Signature`].
pub struct Query<'w> {
    world: &'w World,
    archetypes: Vec<&'w Archetype>,
    signature: Signature,
}

impl<'w> Query<'w> {
    pub(crate) fn new(world: &'w World, archetypes: Vec<&'w Archetype>, signature: Signature) -> Self {
        Self {
            world,
            archetypes,
            signature,
        }
    }

    /// Start a fresh walk over the matches.
    pub fn iter(&self) -> QueryIter<'_, 'w> {
        QueryIter {
            query: self,
            archetype: 0,
            row: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    fn accepts(&self, entity: Entity) -> bool {
        (self.signature.include_disabled || self.world.is_enabled(entity))
            && self.signature.tags.iter().all(|k| self.world.has_tag(entity, k))
    }
}

impl<'q, 'w> IntoIterator for &'q Query<'w> {
    type Item = Entity;
    type IntoIter = QueryIter<'q, 'w>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone)]
pub struct QueryIter<'q, 'w> {
    query: &'q Query<'w>,
    archetype: usize,
    row: usize,
}

impl Iterator for QueryIter<'_, '_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        while let Some(arch) = self.query.archetypes.get(self.archetype) {
            if let Some(&entity) = arch.entities.get(self.row) {
                self.row += 1;
                if self.query.accepts(entity) {
                    return Some(entity);
                }
            } else {
                self.archetype += 1;
                self.row = 0;
            }
        }
        None
    }
}
