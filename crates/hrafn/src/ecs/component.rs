//! # Component Columns
//!
//! Components are plain values. An archetype stores one [`ComponentColumn`]
//! per component kind it holds, with row `i` of every column belonging to the
//! same entity.
//!
//! Columns hold `Box<dyn Any + Send + Sync>` so the archetype never needs the
//! concrete type. Access goes through `downcast_ref`/`downcast_mut`; a type
//! mismatch there is a storage bug and panics.

use std::any::Any;

/// Marker bound for anything storable as a component.
pub trait Component: Any + Send + Sync {}

impl<T: Any + Send + Sync> Component for T {}

pub(crate) type BoxedComponent = Box<dyn Any + Send + Sync>;

/// A type-erased column of components.
pub struct ComponentColumn {
    rows: Vec<BoxedComponent>,
}

impl ComponentColumn {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn push_boxed(&mut self, value: BoxedComponent) {
        self.rows.push(value);
    }

    pub fn get<T: 'static>(&self, row: usize) -> &T {
        self.rows[row].downcast_ref().unwrap_or_else(|| mismatch::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, row: usize) -> &mut T {
        self.rows[row].downcast_mut().unwrap_or_else(|| mismatch::<T>())
    }

    pub fn get_any(&self, row: usize) -> &(dyn Any + Send + Sync) {
        &*self.rows[row]
    }

    /// Replace the value at `row`, returning the old one.
    pub fn replace(&mut self, row: usize, value: BoxedComponent) -> BoxedComponent {
        std::mem::replace(&mut self.rows[row], value)
    }

    /// Swap-remove the value at `row` and hand it back. The last row moves
    /// into `row`.
    pub fn take(&mut self, row: usize) -> BoxedComponent {
        self.rows.swap_remove(row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for ComponentColumn {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch<T>() -> ! {
    panic!(
        "component column does not hold `{}`",
        std::any::type_name::<T>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_and_mutate() {
        let mut col = ComponentColumn::new();
        col.push_boxed(Box::new(1u32));
        col.push_boxed(Box::new(2u32));
        *col.get_mut::<u32>(1) += 40;
        assert_eq!(*col.get::<u32>(0), 1);
        assert_eq!(*col.get::<u32>(1), 42);
    }

    #[test]
    fn take_swaps_last_row_in() {
        let mut col = ComponentColumn::new();
        for v in [10u8, 20, 30] {
            col.push_boxed(Box::new(v));
        }
        let taken = col.take(0);
        assert_eq!(*taken.downcast::<u8>().unwrap(), 10);
        assert_eq!(*col.get::<u8>(0), 30);
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn replace_returns_previous() {
        let mut col = ComponentColumn::new();
        col.push_boxed(Box::new(String::from("old")));
        let old = col.replace(0, Box::new(String::from("new")));
        assert_eq!(*old.downcast::<String>().unwrap(), "old");
        assert_eq!(col.get::<String>(0), "new");
    }

    #[test]
    #[should_panic(expected = "does not hold")]
    fn wrong_type_panics() {
        let mut col = ComponentColumn::new();
        col.push_boxed(Box::new(1u32));
        let _ = col.get::<f32>(0);
    }
}
