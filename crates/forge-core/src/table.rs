// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Primary item and property tables.
//!
//! Items live in an append-only arena and are referenced everywhere else by
//! [`ItemHandle`]; the item table maps each item type to an ordered list of
//! handles. Insertion order is observable, so per-type lists are plain
//! vectors and the type index is a `BTreeMap` for deterministic iteration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ident::ItemHandle;
use crate::item::Item;

/// Append-only storage for every item the engine has materialized.
///
/// Handles index into this arena and stay valid for its lifetime; removal
/// from a table never frees the underlying item (scope bookkeeping may
/// still refer to it).
#[derive(Debug, Clone, Default)]
pub struct ItemArena {
    items: Vec<Item>,
}

impl ItemArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `item` and returns its handle.
    pub fn alloc(&mut self, item: Item) -> ItemHandle {
        let handle = ItemHandle::from_raw(u32::try_from(self.items.len()).unwrap_or(u32::MAX));
        self.items.push(item);
        handle
    }

    /// Returns the item behind `handle`, if the handle belongs to this arena.
    #[must_use]
    pub fn get(&self, handle: ItemHandle) -> Option<&Item> {
        self.items.get(handle.index())
    }

    /// Mutable access for the global-commit path.
    pub(crate) fn get_mut(&mut self, handle: ItemHandle) -> Option<&mut Item> {
        self.items.get_mut(handle.index())
    }

    /// Number of items ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ordered list of item handles for one item type.
#[derive(Debug, Clone, Default)]
pub struct TypeList {
    /// Item type name as first written (case preserved for display).
    pub name: String,
    /// Handles in insertion order.
    pub handles: Vec<ItemHandle>,
}

/// Mapping from item type to its ordered item list.
///
/// Type names compare case-insensitively; the map key is the folded form
/// and [`TypeList::name`] keeps the first-seen casing.
#[derive(Debug, Clone, Default)]
pub struct ItemTable {
    lists: BTreeMap<String, TypeList>,
}

impl ItemTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handle` to the list for `item_type`.
    pub fn add(&mut self, item_type: &str, handle: ItemHandle) {
        let key = item_type.to_ascii_lowercase();
        let list = self.lists.entry(key).or_insert_with(|| TypeList {
            name: item_type.to_owned(),
            handles: Vec::new(),
        });
        list.handles.push(handle);
    }

    /// Removes `handle` from the list for `item_type`; returns whether it
    /// was present.
    pub fn remove(&mut self, item_type: &str, handle: ItemHandle) -> bool {
        let key = item_type.to_ascii_lowercase();
        match self.lists.get_mut(&key) {
            Some(list) => {
                let before = list.handles.len();
                list.handles.retain(|h| *h != handle);
                before != list.handles.len()
            }
            None => false,
        }
    }

    /// Handles of `item_type` in insertion order (empty when unknown).
    #[must_use]
    pub fn handles_of(&self, item_type: &str) -> &[ItemHandle] {
        self.lists
            .get(&item_type.to_ascii_lowercase())
            .map_or(&[], |list| list.handles.as_slice())
    }

    /// Iterates `(display name, handles)` per type in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ItemHandle])> {
        self.lists
            .values()
            .map(|list| (list.name.as_str(), list.handles.as_slice()))
    }

    /// True when no type has any items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.values().all(|l| l.handles.is_empty())
    }
}

/// A named string value. Names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name as first written.
    pub name: String,
    /// Property value.
    pub value: String,
}

impl Property {
    /// Creates a property.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Mapping from case-insensitive name to [`Property`]; last writer wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyTable {
    entries: BTreeMap<String, Property>,
}

impl PartialEq for PropertyTable {
    fn eq(&self, other: &Self) -> bool {
        // Names compare case-insensitively (the folded keys), values
        // case-sensitively; display casing is not identity.
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((ka, pa), (kb, pb))| ka == kb && pa.value == pb.value)
    }
}

impl Eq for PropertyTable {}

impl PropertyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a property by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    /// Looks up a property value by case-insensitive name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.value.as_str())
    }

    /// Inserts `property`, replacing any previous value for the same name.
    pub fn set(&mut self, property: Property) {
        self.entries
            .insert(property.name.to_ascii_lowercase(), property);
    }

    /// Iterates properties in deterministic (folded-name) order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.values()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for PropertyTable {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, value) in iter {
            table.set(Property::new(name, value));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_lists_preserve_insertion_order() {
        let mut arena = ItemArena::new();
        let mut table = ItemTable::new();
        let a = arena.alloc(Item::new("i1", "a1"));
        let b = arena.alloc(Item::new("I1", "a2"));
        table.add("i1", a);
        table.add("I1", b);
        assert_eq!(table.handles_of("i1"), &[a, b]);
        assert_eq!(table.handles_of("I1"), &[a, b]);
    }

    #[test]
    fn property_last_writer_wins() {
        let mut table = PropertyTable::new();
        table.set(Property::new("Obj", "one"));
        table.set(Property::new("OBJ", "two"));
        assert_eq!(table.value("obj"), Some("two"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unknown_type_reads_empty() {
        let table = ItemTable::new();
        assert!(table.handles_of("missing").is_empty());
    }
}
