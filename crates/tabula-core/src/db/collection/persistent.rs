//! Persistent collection wrappers.
//!
//! A persistent collection holds the current elements next to the snapshot
//! taken when it was loaded (or last flushed) and answers, per entry, whether
//! the row coordinators must insert, update or delete a row.

use crate::{error::InternalError, model::collection::CollectionModel, value::Value};

///
/// Removal
/// One row to delete: by position for indexed join tables, by element otherwise.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Removal {
    Position(usize),
    Element(Value),
}

///
/// PersistentCollection
///
/// Session-side view of one collection instance. `Value::Null` entries are
/// holes and never produce rows.
///

pub trait PersistentCollection {
    /// Current elements in iteration order.
    fn entries(&self) -> &[Value];

    fn needs_inserting(&self, entry: &Value, position: usize) -> bool;

    fn needs_updating(&self, entry: &Value, position: usize) -> bool;

    /// Rows to delete since the snapshot.
    fn removals(&self, by_position: bool) -> Vec<Removal>;

    /// An element was removed in a way that shifts later positions.
    fn has_structural_removal(&self) -> bool;

    /// Hook run once before any row is inserted.
    fn pre_insert(&mut self, _role: &CollectionModel) -> Result<(), InternalError> {
        Ok(())
    }
}

///
/// PersistentList
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistentList {
    elements: Vec<Value>,
    snapshot: Vec<Value>,
    element_removed: bool,
}

impl PersistentList {
    /// A list loaded from the database with `elements`.
    #[must_use]
    pub fn loaded(elements: Vec<Value>) -> Self {
        Self {
            snapshot: elements.clone(),
            elements,
            element_removed: false,
        }
    }

    /// A list created in memory; every element is new.
    #[must_use]
    pub const fn transient(elements: Vec<Value>) -> Self {
        Self {
            elements,
            snapshot: Vec::new(),
            element_removed: false,
        }
    }

    pub fn push(&mut self, element: impl Into<Value>) {
        self.elements.push(element.into());
    }

    /// Replace the element at `position`, returning the previous one.
    pub fn set(&mut self, position: usize, element: impl Into<Value>) -> Option<Value> {
        self.elements
            .get_mut(position)
            .map(|slot| std::mem::replace(slot, element.into()))
    }

    pub fn remove(&mut self, position: usize) -> Option<Value> {
        if position >= self.elements.len() {
            return None;
        }
        self.element_removed = true;

        Some(self.elements.remove(position))
    }

    pub fn clear(&mut self) {
        if !self.elements.is_empty() {
            self.element_removed = true;
        }
        self.elements.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Accept the current elements as persisted.
    pub fn sync_snapshot(&mut self) {
        self.snapshot.clone_from(&self.elements);
        self.element_removed = false;
    }

    fn snapshot_at(&self, position: usize) -> Option<&Value> {
        self.snapshot.get(position).filter(|value| !value.is_null())
    }
}

impl PersistentCollection for PersistentList {
    fn entries(&self) -> &[Value] {
        &self.elements
    }

    fn needs_inserting(&self, entry: &Value, position: usize) -> bool {
        !entry.is_null() && self.snapshot_at(position).is_none()
    }

    fn needs_updating(&self, entry: &Value, position: usize) -> bool {
        !entry.is_null() && self.snapshot_at(position).is_some_and(|old| old != entry)
    }

    fn removals(&self, by_position: bool) -> Vec<Removal> {
        self.snapshot
            .iter()
            .enumerate()
            .filter(|(_, old)| !old.is_null())
            .filter_map(|(position, old)| {
                if by_position {
                    let vacated = self
                        .elements
                        .get(position)
                        .is_none_or(Value::is_null);
                    vacated.then_some(Removal::Position(position))
                } else {
                    // a moved element keeps its row
                    (!self.elements.contains(old)).then(|| Removal::Element(old.clone()))
                }
            })
            .collect()
    }

    fn has_structural_removal(&self) -> bool {
        self.element_removed
    }
}

///
/// PersistentBag
///
/// Unordered, duplicates allowed. Rows carry no position, so a decreased
/// element count deletes every row of that element and re-inserts the
/// remaining occurrences.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistentBag {
    elements: Vec<Value>,
    snapshot: Vec<Value>,
}

impl PersistentBag {
    #[must_use]
    pub fn loaded(elements: Vec<Value>) -> Self {
        Self {
            snapshot: elements.clone(),
            elements,
        }
    }

    #[must_use]
    pub const fn transient(elements: Vec<Value>) -> Self {
        Self {
            elements,
            snapshot: Vec::new(),
        }
    }

    pub fn push(&mut self, element: impl Into<Value>) {
        self.elements.push(element.into());
    }

    /// Remove one occurrence of `element`.
    pub fn remove(&mut self, element: &Value) -> bool {
        match self.elements.iter().position(|current| current == element) {
            Some(position) => {
                self.elements.remove(position);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn sync_snapshot(&mut self) {
        self.snapshot.clone_from(&self.elements);
    }

    fn count(values: &[Value], element: &Value) -> usize {
        values.iter().filter(|value| *value == element).count()
    }

    fn decreased(&self, element: &Value) -> bool {
        Self::count(&self.elements, element) < Self::count(&self.snapshot, element)
    }
}

impl PersistentCollection for PersistentBag {
    fn entries(&self) -> &[Value] {
        &self.elements
    }

    fn needs_inserting(&self, entry: &Value, position: usize) -> bool {
        if entry.is_null() {
            return false;
        }
        if self.decreased(entry) {
            return true;
        }

        let seen = self
            .elements
            .iter()
            .take(position + 1)
            .filter(|value| *value == entry)
            .count();

        seen > Self::count(&self.snapshot, entry)
    }

    fn needs_updating(&self, _: &Value, _: usize) -> bool {
        false
    }

    fn removals(&self, _: bool) -> Vec<Removal> {
        let mut removals = Vec::new();
        for old in &self.snapshot {
            if old.is_null() || !self.decreased(old) {
                continue;
            }
            let removal = Removal::Element(old.clone());
            if !removals.contains(&removal) {
                removals.push(removal);
            }
        }

        removals
    }

    fn has_structural_removal(&self) -> bool {
        false
    }
}
